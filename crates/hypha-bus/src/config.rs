use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Client-side bus configuration
///
/// Every timeout is optional and absent by default: a pending operation with
/// no configured timeout waits until the channel resolves it, which is the
/// behavior the rest of the system was built against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Identity announced to the broker; generated when absent
    #[serde(default)]
    pub client_id: Option<String>,

    /// Capacity of the inbound fan-out channel
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// First reconnect delay after a lost connection (milliseconds)
    #[serde(default = "default_reconnect_initial_ms")]
    pub reconnect_initial_ms: u64,

    /// Ceiling for the exponential reconnect backoff (milliseconds)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Optional bound on waiting for a broker acknowledgment (milliseconds)
    #[serde(default)]
    pub ack_timeout_ms: Option<u64>,
}

fn default_channel_capacity() -> usize {
    1024
}

fn default_reconnect_initial_ms() -> u64 {
    100
}

fn default_reconnect_max_ms() -> u64 {
    5_000
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            channel_capacity: default_channel_capacity(),
            reconnect_initial_ms: default_reconnect_initial_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            ack_timeout_ms: None,
        }
    }
}

impl BusConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: BusConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be nonzero".to_string(),
            ));
        }
        if self.reconnect_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_initial_ms must be nonzero".to_string(),
            ));
        }
        if self.reconnect_max_ms < self.reconnect_initial_ms {
            return Err(ConfigError::Invalid(format!(
                "reconnect_max_ms ({}) is below reconnect_initial_ms ({})",
                self.reconnect_max_ms, self.reconnect_initial_ms
            )));
        }
        Ok(())
    }

    pub fn reconnect_initial(&self) -> Duration {
        Duration::from_millis(self.reconnect_initial_ms)
    }

    pub fn reconnect_max(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_ms)
    }

    pub fn ack_timeout(&self) -> Option<Duration> {
        self.ack_timeout_ms.map(Duration::from_millis)
    }
}
