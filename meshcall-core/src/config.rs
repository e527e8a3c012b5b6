use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub conference: ConferenceConfig,
    pub camera: CameraConfig,
    pub viewport: ViewportConfig,
    pub encoder: EncoderConfig,
    pub transport: TransportConfig,
    pub logging: LoggingConfig,
}

/// Call shape: how many people are in the call and whether we also share a screen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConferenceConfig {
    /// Number of attendees including the local user
    pub participants: usize,
    /// Run an extra screen-share encoder alongside the camera
    pub presenting: bool,
    /// Video codec for the camera legs ("VP8" or "VP9")
    pub codec: String,
}

impl Default for ConferenceConfig {
    fn default() -> Self {
        Self {
            participants: 5,
            presenting: false,
            codec: "VP9".to_string(),
        }
    }
}

/// Native mode of the simulated camera
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            frame_rate: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for ViewportConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Simulated SVC encoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Pictures between two key frames
    pub keyframe_interval: u64,
    /// Pictures to encode before the call ends (0 = until interrupted)
    pub frames: u64,
    /// Delay between two pictures in milliseconds
    pub frame_interval_ms: u64,
    /// Payload size of one spatial layer frame in bytes
    pub layer_payload_bytes: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            keyframe_interval: 90,
            frames: 300,
            frame_interval_ms: 33,
            layer_payload_bytes: 1200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Capacity of the in-process channel between both ends of a leg
    pub leg_channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            leg_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // MESHCALL_CONFERENCE__PARTICIPANTS, MESHCALL_LOGGING__LEVEL, ...
        builder = builder.add_source(
            Environment::with_prefix("MESHCALL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every section and report all problems at once
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.conference.participants < 2 {
            errors.push(format!(
                "conference.participants must be at least 2, got {}",
                self.conference.participants
            ));
        }
        if !matches!(self.conference.codec.to_uppercase().as_str(), "VP8" | "VP9") {
            errors.push(format!(
                "conference.codec must be VP8 or VP9, got {}",
                self.conference.codec
            ));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            errors.push("camera resolution must be non-zero".to_string());
        }
        if self.camera.frame_rate == 0 {
            errors.push("camera.frame_rate must be non-zero".to_string());
        }
        if self.viewport.width == 0 || self.viewport.height == 0 {
            errors.push("viewport size must be non-zero".to_string());
        }
        if self.encoder.keyframe_interval == 0 {
            errors.push("encoder.keyframe_interval must be non-zero".to_string());
        }
        if self.transport.leg_channel_capacity == 0 {
            errors.push("transport.leg_channel_capacity must be non-zero".to_string());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format must be json or pretty, got {}",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.conference.participants, 5);
        assert!(!config.conference.presenting);
        assert_eq!(config.camera.height, 720);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let mut config = Config::default();
        config.conference.participants = 1;
        config.conference.codec = "H264".to_string();
        config.transport.leg_channel_capacity = 0;

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors[0].contains("participants"));
        assert!(errors[1].contains("codec"));
    }

    #[test]
    fn test_load_from_yaml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "conference:\n  participants: 12\n  presenting: true\ncamera:\n  height: 1080"
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.conference.participants, 12);
        assert!(config.conference.presenting);
        assert_eq!(config.camera.height, 1080);
        // untouched sections keep their defaults
        assert_eq!(config.camera.width, 1280);
        assert_eq!(config.logging.level, "info");
    }
}
