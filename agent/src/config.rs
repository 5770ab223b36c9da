//! Agent server configuration.
//!
//! Handles loading the listener settings from environment variables with sensible defaults.
//! The remote-write output itself is configured through [`shared::config::OutputConfig`].

use anyhow::{Context, Result};
use std::net::SocketAddr;

/// Port the agent listens on when none is configured.
pub const DEFAULT_PORT: u16 = 6566;

/// Server configuration.
///
/// Configuration values can be set via environment variables:
/// - `PROMFLUSH_HOST`: The host address to bind to (default: "0.0.0.0")
/// - `PROMFLUSH_PORT`: The port to listen on (default: 6566)
#[derive(Debug, Clone)]
pub struct Config {
    /// The host address to bind to.
    pub host: String,
    /// The port to listen on.
    pub port: u16,
}

impl Config {
    /// Creates a new configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PROMFLUSH_PORT` is set but is not a valid port number.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("PROMFLUSH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = std::env::var("PROMFLUSH_PORT")
            .ok()
            .map(|p| p.parse::<u16>())
            .transpose()
            .context("PROMFLUSH_PORT is not a valid port")?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self { host, port })
    }

    /// Returns the socket address for binding.
    ///
    /// # Errors
    ///
    /// Returns an error if the host and port do not form a valid socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 6566);
    }

    #[test]
    fn test_config_socket_addr() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        assert_eq!(config.socket_addr().unwrap().to_string(), "127.0.0.1:3000");
    }

    #[test]
    fn test_config_invalid_host() {
        let config = Config {
            host: "not an address".to_string(),
            port: 3000,
        };
        assert!(config.socket_addr().is_err());
    }
}
