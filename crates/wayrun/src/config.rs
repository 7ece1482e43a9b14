use serde::Deserialize;
use serde::Serialize;
use waypack::HEADER_SIZE;
use waypack::MAX_MESSAGE_SIZE;

/// Per-connection limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Undecoded bytes a session holds before giving up on the client.
    pub max_inbound_bytes: usize,
    /// Received descriptors not yet claimed by a message.
    pub max_queued_fds: usize,
    /// Destroyed ids remembered so late requests to them read as stale.
    pub stale_id_capacity: usize,
    /// Largest message accepted or produced.
    pub max_message_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inbound_bytes: 64 * 1024,
            max_queued_fds: 256,
            stale_id_capacity: 1024,
            max_message_size: 4096,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse session config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize session config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid session config: {0}")]
    Invalid(String),
}

impl SessionConfig {
    /// Parses a config, filling absent keys with defaults.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SessionConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_message_size < HEADER_SIZE || self.max_message_size > MAX_MESSAGE_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_message_size must lie in {HEADER_SIZE}..={MAX_MESSAGE_SIZE}, got {}",
                self.max_message_size
            )));
        }
        if self.max_inbound_bytes < self.max_message_size {
            return Err(ConfigError::Invalid(format!(
                "max_inbound_bytes ({}) is below max_message_size ({})",
                self.max_inbound_bytes, self.max_message_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() -> anyhow::Result<()> {
        let config = SessionConfig::from_toml_str("stale_id_capacity = 8\nmax_queued_fds = 4\n")?;
        assert_eq!(config.stale_id_capacity, 8);
        assert_eq!(config.max_queued_fds, 4);
        assert_eq!(config.max_inbound_bytes, SessionConfig::default().max_inbound_bytes);
        Ok(())
    }

    #[test]
    fn test_toml_roundtrip() -> anyhow::Result<()> {
        let config = SessionConfig { max_message_size: 1024, ..SessionConfig::default() };
        let text = config.to_toml_string()?;
        assert!(text.contains("max_message_size = 1024"));
        assert_eq!(SessionConfig::from_toml_str(&text)?, config);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_limits() {
        assert!(matches!(
            SessionConfig::from_toml_str("max_message_size = 4"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("max_message_size = 2048\nmax_inbound_bytes = 1024"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            SessionConfig::from_toml_str("max_queued_fds = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
