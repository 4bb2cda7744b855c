use crate::core::builder::states::{HasEndpoint, NoSink};
use crate::core::builder::ConnectionBuilder;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

/// Environment variable overriding the configured endpoint
pub const ENDPOINT_ENV_VAR: &str = "STREAMSOCKETS_ENDPOINT";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to load settings file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid settings: {0}")]
    ValidationError(String),
}

/// Connection settings as loaded from YAML
///
/// ```yaml
/// endpoint: wss://stream.example.com/feed
/// subprotocols: [v2.feed]
/// handshake_timeout_secs: 10
/// keepalive_interval_secs: 5
/// pong_timeout_secs: 15
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub endpoint: String,
    #[serde(default)]
    pub subprotocols: Vec<String>,
    pub handshake_timeout_secs: Option<u64>,
    pub close_timeout_secs: Option<u64>,
    pub keepalive_interval_secs: Option<u64>,
    pub pong_timeout_secs: Option<u64>,
    pub max_message_size: Option<usize>,
    pub max_frame_size: Option<usize>,
}

impl ConnectionSettings {
    /// Load settings from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let yaml_content = std::fs::read_to_string(path)?;
        let mut settings = Self::from_yaml_str(&yaml_content)?;

        // Override endpoint from environment if present
        if let Ok(endpoint) = std::env::var(ENDPOINT_ENV_VAR) {
            info!("Overriding endpoint from environment variable");
            settings.endpoint = endpoint;
            settings.validate()?;
        }

        Ok(settings)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, SettingsError> {
        let settings: ConnectionSettings = serde_yaml::from_str(yaml)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Builder with the endpoint and every knob applied; only the sink is missing
    pub fn builder(&self) -> ConnectionBuilder<HasEndpoint, NoSink> {
        ConnectionBuilder::new()
            .endpoint(self.endpoint.clone())
            .settings(self)
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(SettingsError::ValidationError(format!(
                "endpoint must be a ws:// or wss:// URL, got {:?}",
                self.endpoint
            )));
        }

        for (name, value) in [
            ("handshake_timeout_secs", self.handshake_timeout_secs),
            ("close_timeout_secs", self.close_timeout_secs),
            ("keepalive_interval_secs", self.keepalive_interval_secs),
            ("pong_timeout_secs", self.pong_timeout_secs),
        ] {
            if value == Some(0) {
                return Err(SettingsError::ValidationError(format!(
                    "{} must be greater than 0",
                    name
                )));
            }
        }

        if self.pong_timeout_secs.is_some() && self.keepalive_interval_secs.is_none() {
            return Err(SettingsError::ValidationError(
                "pong_timeout_secs requires keepalive_interval_secs".to_string(),
            ));
        }

        Ok(())
    }
}
