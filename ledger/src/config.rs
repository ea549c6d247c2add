//! configuration for ledger access and confirmation timing.

use std::time::Duration;

/// ledger client configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// RPC URL for reads, sends and simulation.
    pub rpc_url: String,
    /// websocket URL for signature notifications.
    pub ws_url: String,
    /// how often an unconfirmed transaction is re-sent.
    pub rebroadcast_interval: Duration,
    /// how often signature status is polled.
    pub poll_interval: Duration,
    /// confirmation deadline.
    pub confirm_timeout: Duration,
}

impl Config {
    /// create config for devnet.
    pub fn devnet() -> Self {
        Self::custom("https://api.devnet.solana.com", "wss://api.devnet.solana.com")
    }

    /// create config for a local validator.
    pub fn localnet() -> Self {
        Self::custom("http://localhost:8899", "ws://localhost:8900")
    }

    /// create config with custom endpoints.
    pub fn custom(rpc_url: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            ws_url: ws_url.into(),
            rebroadcast_interval: Duration::from_millis(500),
            poll_interval: Duration::from_millis(2000),
            confirm_timeout: Duration::from_millis(15_000),
        }
    }

    /// set the confirmation deadline.
    pub fn with_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.confirm_timeout = timeout;
        self
    }

    /// set the rebroadcast interval.
    pub fn with_rebroadcast_interval(mut self, interval: Duration) -> Self {
        self.rebroadcast_interval = interval;
        self
    }

    /// set the status poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::localnet()
    }
}
