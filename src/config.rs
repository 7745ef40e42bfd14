use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration for the telemetry node
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    /// No ADC section means the node only reports the soil probe.
    #[serde(default)]
    pub adc: Option<AdcConfig>,
    pub backend: BackendConfig,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    pub port: String,
    pub slave_id: u8,
    pub baud_rate: u32,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            slave_id: 1,
            baud_rate: 9600,
            timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdcConfig {
    pub i2c_bus: String,
    pub address: u8,
    pub channel: u8,        // single-ended input, 0-3
    pub full_scale: f64,    // raw count that maps to reference_volts
    pub reference_volts: f64,
}

impl Default for AdcConfig {
    fn default() -> Self {
        Self {
            i2c_bus: "/dev/i2c-1".to_string(),
            address: 0x48,
            channel: 0,
            full_scale: 32767.0,
            reference_volts: 3.3,
        }
    }
}

/// Cloud destination for the readings
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Thingspeak {
        #[serde(default = "default_thingspeak_url")]
        url: String,
        write_api_key: String,
    },
    Blynk {
        #[serde(default = "default_blynk_url")]
        url: String,
        auth_token: String,
    },
}

fn default_interval_secs() -> u64 {
    10
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_thingspeak_url() -> String {
    "https://api.thingspeak.com/update".to_string()
}

fn default_blynk_url() -> String {
    "https://blynk.cloud/external/api/batch/update".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let credential = match &self.backend {
            BackendConfig::Thingspeak { write_api_key, .. } => write_api_key,
            BackendConfig::Blynk { auth_token, .. } => auth_token,
        };
        if credential.trim().is_empty() {
            return Err(ConfigError::Invalid("backend credential is empty".into()));
        }
        if self.interval_secs == 0 {
            return Err(ConfigError::Invalid("interval_secs must be at least 1".into()));
        }
        if self.serial.timeout_ms == 0 {
            return Err(ConfigError::Invalid("serial.timeout_ms must be at least 1".into()));
        }
        if let Some(adc) = &self.adc {
            if adc.channel > 3 {
                return Err(ConfigError::Invalid(format!(
                    "adc.channel {} out of range 0-3",
                    adc.channel
                )));
            }
            if adc.full_scale <= 0.0 {
                return Err(ConfigError::Invalid("adc.full_scale must be positive".into()));
            }
        }
        Ok(())
    }
}
