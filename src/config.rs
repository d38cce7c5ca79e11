use serde::{Deserialize, Serialize};

use crate::error::{LogError, LogResult};

pub const DEFAULT_FILE_PREFIX: &str = "custom_log";

/// Build information embedded in the log header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceInfo {
    pub app_version: String,
    pub platform_release: String,
    pub manufacturer: String,
    pub model: String,
}

impl DeviceInfo {
    /// Text following `Version: ` in the header
    pub fn version_line(&self) -> String {
        format!(
            "{} Platform: {} Manufacturer: {} Model: {}",
            self.app_version, self.platform_release, self.manufacturer, self.model
        )
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform_release: String::new(),
            manufacturer: String::new(),
            model: String::new(),
        }
    }
}

/// Logger settings, usually handed over as JSON by the host app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub device: DeviceInfo,
    pub file_prefix: String,
    /// Initial state of the GPS-only toggle
    pub gps_only: bool,
}

impl LoggerConfig {
    pub fn from_json(json: &str) -> LogResult<Self> {
        let config: LoggerConfig = serde_json::from_str(json)
            .map_err(|e| LogError::InvalidParameters(format!("Bad logger config: {}", e)))?;

        if config.file_prefix.is_empty() || config.file_prefix.contains(['/', '\\']) {
            return Err(LogError::InvalidParameters(format!(
                "Bad file prefix: {:?}",
                config.file_prefix
            )));
        }
        Ok(config)
    }

    pub fn with_device(mut self, device: DeviceInfo) -> Self {
        self.device = device;
        self
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            device: DeviceInfo::default(),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            gps_only: false,
        }
    }
}
