//! Client configuration loaded from environment variables.
//!
//! All settings have defaults pointing at a local relay so the client can
//! run with zero configuration during development.

use std::time::Duration;

use tutoria_shared::constants::{
    DEFAULT_HTTP_PORT, DEFAULT_PAGE_SIZE, JOIN_TIMEOUT_SECS, NOTIFICATION_POLL_SECS,
};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket endpoint of the chat relay.
    /// Env: `TUTORIA_SOCKET_URL`
    /// Default: `ws://127.0.0.1:8085/ws`
    pub socket_url: String,

    /// Base URL of the REST bootstrap API.
    /// Env: `TUTORIA_API_URL`
    /// Default: `http://127.0.0.1:8085`
    pub api_url: String,

    /// Number of messages per visible-window page.
    /// Env: `TUTORIA_PAGE_SIZE`
    /// Default: `20`
    pub page_size: usize,

    /// Interval between notification poll fetches.
    /// Env: `TUTORIA_POLL_SECS`
    /// Default: `30`
    pub poll_interval: Duration,

    /// How long a room join may stay unanswered before it is declared
    /// timed out.
    pub join_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_url: format!("ws://127.0.0.1:{DEFAULT_HTTP_PORT}/ws"),
            api_url: format!("http://127.0.0.1:{DEFAULT_HTTP_PORT}"),
            page_size: DEFAULT_PAGE_SIZE,
            poll_interval: Duration::from_secs(NOTIFICATION_POLL_SECS),
            join_timeout: Duration::from_secs(JOIN_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("TUTORIA_SOCKET_URL") {
            config.socket_url = url;
        }

        if let Ok(url) = std::env::var("TUTORIA_API_URL") {
            config.api_url = url;
        }

        if let Ok(val) = std::env::var("TUTORIA_PAGE_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.page_size = n,
                _ => {
                    tracing::warn!(value = %val, "Invalid TUTORIA_PAGE_SIZE, using default");
                }
            }
        }

        if let Ok(val) = std::env::var("TUTORIA_POLL_SECS") {
            match val.parse::<u64>() {
                Ok(n) if n > 0 => config.poll_interval = Duration::from_secs(n),
                _ => {
                    tracing::warn!(value = %val, "Invalid TUTORIA_POLL_SECS, using default");
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
