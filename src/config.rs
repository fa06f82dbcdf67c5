use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path, time::Duration};
use thiserror::Error;
use tracing::debug;

use crate::evaluation::unit::EvaluationOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleplayConfig {
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    #[serde(default)]
    pub unit: UnitConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Fail the whole round on the first expression error.
    #[serde(default)]
    pub strict: bool,

    /// How long the CLI waits for the unit to answer one snapshot.
    #[serde(default = "default_reply_timeout", with = "duration_ms")]
    pub reply_timeout: Duration,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            strict: false,
            reply_timeout: default_reply_timeout(),
        }
    }
}

impl EvaluationConfig {
    pub fn options(&self) -> EvaluationOptions {
        EvaluationOptions {
            strict: self.strict,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    #[serde(default = "default_thread_name")]
    pub thread_name: String,

    /// Stack size of the unit thread in bytes.
    #[serde(default = "default_stack_size")]
    pub stack_size: usize,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            thread_name: default_thread_name(),
            stack_size: default_stack_size(),
        }
    }
}

impl RuleplayConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn from_str(s: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads `path` if it exists, otherwise returns the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        Self::from_file(path)
    }
}

fn default_reply_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_thread_name() -> String {
    "ruleplay-evaluation-unit".to_string()
}

fn default_stack_size() -> usize {
    8 * 1024 * 1024
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = RuleplayConfig::from_str("{}").unwrap();
        assert_eq!(config, RuleplayConfig::default());
        assert!(!config.evaluation.strict);
        assert_eq!(config.evaluation.reply_timeout, Duration::from_secs(10));
        assert_eq!(config.unit.thread_name, "ruleplay-evaluation-unit");
        assert_eq!(config.unit.stack_size, 8 * 1024 * 1024);
    }

    #[test]
    fn test_partial_config() {
        let config =
            RuleplayConfig::from_str(r#"{"evaluation": {"strict": true, "reply_timeout": 250}}"#)
                .unwrap();
        assert!(config.evaluation.options().strict);
        assert_eq!(config.evaluation.reply_timeout, Duration::from_millis(250));
        assert_eq!(config.unit, UnitConfig::default());
    }

    #[test]
    fn test_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert_eq!(
            RuleplayConfig::load_or_default(&missing).unwrap(),
            RuleplayConfig::default()
        );

        let path = dir.path().join("ruleplay.json");
        let mut file = File::create(&path).unwrap();
        write!(
            file,
            r#"{{"unit": {{"thread_name": "custom", "stack_size": 4194304}}}}"#
        )
        .unwrap();
        let unit = RuleplayConfig::load_or_default(&path).unwrap().unit;
        assert_eq!(unit.thread_name, "custom");
        assert_eq!(unit.stack_size, 4 * 1024 * 1024);

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            RuleplayConfig::load_or_default(&path),
            Err(ConfigError::Json(_))
        ));
    }
}
