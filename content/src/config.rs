//! storage network endpoints.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// read gateway: price and balance endpoints, base of published uris.
    pub gateway_url: String,
    /// service accepting the multipart bundle upload.
    pub upload_url: String,
    /// wallet address whose balance pays for uploads.
    pub wallet_address: String,
    pub request_timeout: Duration,
}

impl GatewayConfig {
    /// public arweave gateway.
    pub fn mainnet(upload_url: impl Into<String>, wallet_address: impl Into<String>) -> Self {
        Self::custom("https://arweave.net", upload_url, wallet_address)
    }

    /// arlocal on its default port.
    pub fn localnet(wallet_address: impl Into<String>) -> Self {
        Self::custom(
            "http://127.0.0.1:1984",
            "http://127.0.0.1:1984/upload",
            wallet_address,
        )
    }

    pub fn custom(
        gateway_url: impl Into<String>,
        upload_url: impl Into<String>,
        wallet_address: impl Into<String>,
    ) -> Self {
        let gateway_url: String = gateway_url.into();
        Self {
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            upload_url: upload_url.into(),
            wallet_address: wallet_address.into(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// `<gateway>/<id>`
    pub fn content_uri(&self, transaction_id: &str) -> String {
        format!("{}/{}", self.gateway_url, transaction_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_uri_trims_slash() {
        let config = GatewayConfig::custom("https://arweave.net/", "https://up", "w");
        assert_eq!(config.content_uri("abc"), "https://arweave.net/abc");
        assert_eq!(
            GatewayConfig::mainnet("https://up", "w").content_uri("x"),
            "https://arweave.net/x"
        );
    }
}
