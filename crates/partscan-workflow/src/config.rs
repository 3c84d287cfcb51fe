use partscan_capture::CameraFacing;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Delay between QR decode attempts. The original workstation polled
    /// once per second.
    pub scan_interval_ms: u64,
    pub event_channel_capacity: usize,
    /// Facing hint for the QR-scanning camera. The part photo camera is
    /// always acquired with a relaxed "any" preference.
    pub camera_facing: CameraFacing,
    pub log_level: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            scan_interval_ms: 1000,
            event_channel_capacity: 1024,
            camera_facing: CameraFacing::RearPreferred,
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ConfigShape {
    Nested { workflow: WorkflowConfig },
    Flat(WorkflowConfig),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl WorkflowConfig {
    /// Parses workflow config from a TOML string; both a flat document and
    /// a `[workflow]` table are accepted.
    pub fn from_toml_str(input: &str) -> Result<Self, toml::de::Error> {
        match toml::from_str::<ConfigShape>(input)? {
            ConfigShape::Nested { workflow } => Ok(workflow),
            ConfigShape::Flat(config) => Ok(config),
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_str = path_ref.display().to_string();
        let content = fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_str.clone(),
            source,
        })?;
        Self::from_toml_str(&content).map_err(|source| ConfigError::Parse {
            path: path_str,
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "scan_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log level: {}",
                self.log_level
            )));
        }
        Ok(())
    }
}
