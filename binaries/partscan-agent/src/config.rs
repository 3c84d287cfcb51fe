//! Agent configuration: station identity, workflow tuning, logging, and
//! the scripted demo scenario, loadable from a TOML file with CLI
//! overrides on top.

use partscan_core::StationId;
use partscan_workflow::WorkflowConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Station identification.
    pub station: StationIdentity,

    /// Capture workflow tuning.
    pub workflow: WorkflowConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Scripted collaborators for the demo run.
    pub demo: DemoConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            station: StationIdentity::default(),
            workflow: WorkflowConfig::default(),
            logging: LoggingConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

/// Station identity configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationIdentity {
    /// Unique station ID. Falls back to a local placeholder when unset.
    pub station_id: Option<String>,

    /// Human-readable station name.
    pub name: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` overrides.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Scripted inputs for a demo pass: what the simulated QR camera will
/// eventually decode and what the simulated classifier will answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    /// Payload the simulated decoder reports once the misses run out.
    pub qr_text: String,

    /// Decode attempts that find no code before the payload appears.
    pub decode_misses: u32,

    /// Classifier output, ranked by the workflow at capture time.
    pub predictions: Vec<DemoPrediction>,

    /// Synthetic camera frame dimensions.
    pub frame_width: u32,
    pub frame_height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemoPrediction {
    pub label: String,
    pub confidence: f32,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            qr_text: "PART-123".to_string(),
            decode_misses: 2,
            predictions: vec![
                DemoPrediction {
                    label: "PART-123".to_string(),
                    confidence: 0.91,
                },
                DemoPrediction {
                    label: "PART-456".to_string(),
                    confidence: 0.40,
                },
            ],
            frame_width: 640,
            frame_height: 480,
        }
    }
}

impl AgentConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) {
        if let Some(ref station_id) = args.station_id {
            self.station.station_id = Some(station_id.clone());
        }
        if let Some(ref qr_text) = args.qr_text {
            self.demo.qr_text = qr_text.clone();
        }
        if let Some(interval) = args.scan_interval_ms {
            self.workflow.scan_interval_ms = interval;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.workflow.validate()?;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("invalid log level: {}", self.logging.level);
        }

        if self.demo.qr_text.is_empty() {
            anyhow::bail!("demo.qr_text must not be empty");
        }
        if self.demo.frame_width == 0 || self.demo.frame_height == 0 {
            anyhow::bail!("demo frame dimensions must be non-zero");
        }
        for prediction in &self.demo.predictions {
            if !(0.0..=1.0).contains(&prediction.confidence) {
                anyhow::bail!(
                    "demo prediction '{}' has confidence outside [0.0, 1.0]",
                    prediction.label
                );
            }
        }

        Ok(())
    }

    /// Returns the station ID, falling back to a local placeholder.
    pub fn station_id(&self) -> StationId {
        StationId(
            self.station
                .station_id
                .clone()
                .unwrap_or_else(|| "workstation-local".to_string()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::AgentConfig;

    #[test]
    fn default_config_validates() {
        let config = AgentConfig::default();
        config.validate().expect("defaults are valid");
        assert_eq!(config.station_id().0, "workstation-local");
        assert_eq!(config.workflow.scan_interval_ms, 1000);
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let mut config = AgentConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_demo_qr_text_is_rejected() {
        let mut config = AgentConfig::default();
        config.demo.qr_text.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn out_of_range_demo_confidence_is_rejected() {
        let mut config = AgentConfig::default();
        config.demo.predictions[0].confidence = 1.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn parse_round_trip() {
        let config = AgentConfig::default();
        let toml_str = toml::to_string(&config).expect("serialize");
        let parsed: AgentConfig = toml::from_str(&toml_str).expect("parse");
        assert_eq!(parsed.demo.qr_text, config.demo.qr_text);
        assert_eq!(
            parsed.workflow.scan_interval_ms,
            config.workflow.scan_interval_ms
        );
    }

    #[test]
    fn partial_file_takes_defaults() {
        let input = r#"
[station]
station_id = "line-4-station-2"

[workflow]
scan_interval_ms = 250
"#;
        let config: AgentConfig = toml::from_str(input).expect("parse");
        assert_eq!(config.station_id().0, "line-4-station-2");
        assert_eq!(config.workflow.scan_interval_ms, 250);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.demo.qr_text, "PART-123");
    }
}
