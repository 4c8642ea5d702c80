//! Relay configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the relay can start with zero
//! configuration for local development.

use std::net::SocketAddr;

use tutoria_shared::constants::{DEFAULT_HISTORY_LIMIT, DEFAULT_HTTP_PORT};

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Socket address the HTTP and WebSocket server listens on.
    /// Env: `TUTORIA_RELAY_ADDR`
    /// Default: `0.0.0.0:8085`
    pub http_addr: SocketAddr,

    /// Messages retained per room; older entries are evicted.
    /// Env: `TUTORIA_HISTORY_LIMIT`
    /// Default: `500`
    pub history_limit: usize,

    /// Human-readable name for this relay instance.
    /// Env: `TUTORIA_RELAY_NAME`
    /// Default: `"Tutoria Relay"`
    pub instance_name: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            instance_name: "Tutoria Relay".to_string(),
        }
    }
}

impl RelayConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TUTORIA_RELAY_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid TUTORIA_RELAY_ADDR, using default"
                );
            }
        }

        if let Ok(val) = std::env::var("TUTORIA_HISTORY_LIMIT") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.history_limit = n,
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid TUTORIA_HISTORY_LIMIT, using default"
                    );
                }
            }
        }

        if let Ok(name) = std::env::var("TUTORIA_RELAY_NAME") {
            if !name.is_empty() {
                config.instance_name = name;
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8085).into());
        assert_eq!(config.history_limit, 500);
        assert_eq!(config.instance_name, "Tutoria Relay");
    }
}
