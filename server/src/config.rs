use std::net::SocketAddr;
use std::time::Duration;

/// configuration for the trigger server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// address to bind the TCP server to.
    pub bind_addr: SocketAddr,

    /// maximum size of HTTP request in bytes.
    pub max_request_size: usize,

    /// maximum number of concurrent TCP connections.
    pub max_connections: usize,

    /// time allowed to receive a full request.
    pub read_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            max_request_size: 64 * 1024, // 64KB
            max_connections: 64,
            read_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// set bind address.
    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// set maximum request size.
    pub fn with_max_request_size(mut self, size: usize) -> Self {
        self.max_request_size = size;
        self
    }

    /// set maximum number of concurrent connections.
    pub fn with_max_connections(mut self, count: usize) -> Self {
        self.max_connections = count;
        self
    }

    /// set request read timeout.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_request_size == 0 {
            return Err("Max request size must be greater than 0".to_string());
        }

        if self.max_connections == 0 {
            return Err("Max connections must be greater than 0".to_string());
        }

        if self.read_timeout.is_zero() {
            return Err("Read timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr.port(), 8080);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ServerConfig::new()
            .with_bind_addr("127.0.0.1:9000".parse().unwrap())
            .with_max_connections(2)
            .with_read_timeout(Duration::from_secs(1));

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.max_connections, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        assert!(ServerConfig::new().with_max_connections(0).validate().is_err());
        assert!(ServerConfig::new().with_max_request_size(0).validate().is_err());
    }
}
