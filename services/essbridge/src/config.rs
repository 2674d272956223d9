//! Bridge configuration
//!
//! Priority (highest to lowest):
//! 1. Command-line overrides (see [`crate::cli::Args`])
//! 2. Environment variables, `ESSBRIDGE_` prefix, `__` between sections
//!    (e.g. `ESSBRIDGE_DEVICE__HOST=10.0.0.5`)
//! 3. Config file given with `--config` (YAML, TOML or JSON)
//! 4. Built-in defaults

use std::path::Path;
use std::time::Duration;

use ess_modbus::RegisterBank;
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};
use crate::logging::LogFormat;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "ESSBRIDGE_";

/// Default HTTP port for the JSON API
pub const DEFAULT_API_PORT: u16 = 8081;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BridgeConfig {
    pub device: DeviceConfig,
    pub poll: PollConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Where and what to poll
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    /// Modbus unit (slave) id; 0 is broadcast and not allowed
    pub unit_id: u8,
    pub bank: RegisterBank,
    pub address: u16,
    /// Bounds connect and each request/response exchange
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 10,
            bank: RegisterBank::Input,
            address: 0,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_API_PORT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl BridgeConfig {
    /// Defaults, then `path` if given, then environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(BridgeConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(file_provider(path)?);
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        Ok(figment.extract()?)
    }

    /// Load a single file over the defaults, ignoring the environment
    pub fn load_from_file(path: &Path) -> Result<Self> {
        Ok(Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(file_provider(path)?)
            .extract()?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(BridgeError::config("device.host must not be empty"));
        }
        if self.device.unit_id == 0 {
            return Err(BridgeError::config(
                "device.unit_id 0 is broadcast; use 1..=247",
            ));
        }
        if self.device.timeout_ms == 0 {
            return Err(BridgeError::config("device.timeout_ms must be > 0"));
        }
        if self.poll.interval_ms == 0 {
            return Err(BridgeError::config("poll.interval_ms must be > 0"));
        }
        Ok(())
    }

    pub fn device_address(&self) -> String {
        format!("{}:{}", self.device.host, self.device.port)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.device.timeout_ms)
    }
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.exists() {
        return Err(BridgeError::config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }

    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| BridgeError::config("Config file must have an extension"))?;

    match extension {
        "yaml" | "yml" => Ok(Figment::from(Yaml::file(path))),
        "toml" => Ok(Figment::from(Toml::file(path))),
        "json" => Ok(Figment::from(Json::file(path))),
        _ => Err(BridgeError::config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}
