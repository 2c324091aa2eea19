use std::path::Path;

use serde::{Deserialize, Serialize};

use super::protocol::{DEFAULT_PORT, DEFAULT_TICK_RATE};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Timing of the reliability layer, all in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub connect_timeout_secs: f64,
    pub connect_retry_secs: f64,
    pub timeout_secs: f64,
    pub keep_alive_secs: f64,
    pub resend_min_secs: f64,
    pub max_in_flight: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 5.0,
            connect_retry_secs: 0.25,
            timeout_secs: 10.0,
            keep_alive_secs: 1.0,
            resend_min_secs: 0.1,
            max_in_flight: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Local port to bind, 0 for any.
    pub port: u16,
    pub input_send_interval_secs: f64,
    pub clock_resync_interval_secs: f64,
    pub frame_history: usize,
    pub connection: ConnectionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            port: 0,
            input_send_interval_secs: 0.05,
            clock_resync_interval_secs: 5.0,
            frame_history: 64,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub max_clients: usize,
    pub tick_rate: u32,
    pub snapshot_interval_secs: f64,
    pub connection: ConnectionConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            max_clients: 8,
            tick_rate: DEFAULT_TICK_RATE,
            snapshot_interval_secs: 0.05,
            connection: ConnectionConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: ServerConfig = toml::from_str(
            r#"
            max_clients = 2

            [connection]
            timeout_secs = 3.5
            "#,
        )
        .unwrap();

        assert_eq!(config.max_clients, 2);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.connection.timeout_secs, 3.5);
        assert_eq!(config.connection.keep_alive_secs, 1.0);
    }

    #[test]
    fn test_client_config_from_empty_file() {
        let config: ClientConfig = toml::from_str("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn test_load_missing_file() {
        let result = ClientConfig::load("/nonexistent/rocketmen-client.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
