//! Runtime configuration parsing and management.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// What `create_frame` does when the name is already registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateFramePolicy {
    /// Unload the existing frame, then register the new one in its place
    #[default]
    Replace,
    /// Refuse with `FrameError::DuplicateFrame`
    Reject,
}

/// Timing and sizing knobs for the runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_pool_size")]
    pub frame_pool_size: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub mailbox_poll_interval_ms: u64,

    #[serde(default = "default_join_timeout_ms")]
    pub stop_join_timeout_ms: u64,

    #[serde(default)]
    pub duplicate_frames: DuplicateFramePolicy,
}

fn default_pool_size() -> usize {
    4
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_join_timeout_ms() -> u64 {
    1000
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            frame_pool_size: default_pool_size(),
            mailbox_poll_interval_ms: default_poll_interval_ms(),
            stop_join_timeout_ms: default_join_timeout_ms(),
            duplicate_frames: DuplicateFramePolicy::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Parse configuration from YAML text
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "frame_pool_size must be at least 1".to_string(),
            ));
        }
        if self.mailbox_poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "mailbox_poll_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.mailbox_poll_interval_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_join_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_mapping() {
        let config = RuntimeConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.frame_pool_size, 4);
        assert_eq!(config.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.join_timeout(), Duration::from_secs(1));
        assert_eq!(config.duplicate_frames, DuplicateFramePolicy::Replace);
    }

    #[test]
    fn test_partial_override() {
        let config = RuntimeConfig::from_yaml_str(
            "frame_pool_size: 2\nduplicate_frames: reject\n",
        )
        .unwrap();
        assert_eq!(config.frame_pool_size, 2);
        assert_eq!(config.duplicate_frames, DuplicateFramePolicy::Reject);
        assert_eq!(config.mailbox_poll_interval_ms, 100);
    }

    #[test]
    fn test_zero_pool_rejected() {
        let result = RuntimeConfig::from_yaml_str("frame_pool_size: 0");
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_bad_yaml() {
        let result = RuntimeConfig::from_yaml_str("frame_pool_size: [oops");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mailbox_poll_interval_ms: 25").unwrap();

        let config = RuntimeConfig::from_file(file.path()).unwrap();
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
    }

    #[test]
    fn test_missing_file() {
        let result = RuntimeConfig::from_file("/nonexistent/stagehand.yml");
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }
}
