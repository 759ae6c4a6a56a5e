//! Block settings
//!
//! Settings live in `<config dir>/barblocks/config.json`. Every field is
//! optional; a missing file or section falls back to the defaults below.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const APP_DIR_NAME: &str = "barblocks";
const CONFIG_FILENAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Color tokens handed to the status bar for each severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorScheme {
    pub good: String,
    pub degraded: String,
    pub bad: String,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self {
            good: "#00FF00".to_string(),
            degraded: "#FFFF00".to_string(),
            bad: "#FF0000".to_string(),
        }
    }
}

/// EE quota block options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EeQuotaConfig {
    /// Shown while the allowance is readable
    pub format: String,
    /// Shown when the status page is unreachable or unreadable
    pub format_down: String,
    /// Quota (in the page's unit) below which the block is bad
    pub bad_threshold: f64,
    /// Quota below which the block is degraded
    pub degraded_threshold: f64,
}

impl Default for EeQuotaConfig {
    fn default() -> Self {
        Self {
            format: "EE:{quota_left}/{quota_total}[{quota_days}d]".to_string(),
            format_down: "ɆɆ".to_string(),
            bad_threshold: 1.0,
            degraded_threshold: 3.0,
        }
    }
}

/// Huawei modem block options
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaweiConfig {
    /// Base URL of the modem web interface
    pub url: String,
    /// Glyph per signal level, indexed by the modem's signal icon value
    pub signal_chars: String,
    pub format_up: String,
    pub format_down: String,
    pub bad_threshold: f64,
    pub degraded_threshold: f64,
}

impl Default for HuaweiConfig {
    fn default() -> Self {
        Self {
            url: "http://192.168.8.1".to_string(),
            signal_chars: "⁰¹²³⁴⁵".to_string(),
            format_up: "H:{signal_icon} {current_network_type}".to_string(),
            format_down: "Modem Not found".to_string(),
            bad_threshold: 2.0,
            degraded_threshold: 3.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub colors: ColorScheme,
    pub ee_quota: EeQuotaConfig,
    pub huawei: HuaweiConfig,
}

impl Settings {
    /// Load settings from `path`, or from the default location when `None`
    ///
    /// An explicit path must exist; the default location may be absent.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let settings = match path {
            Some(path) => Self::read(path)?,
            None => match default_path() {
                Some(path) if path.exists() => Self::read(&path)?,
                _ => {
                    tracing::debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_thresholds(
            "ee_quota",
            self.ee_quota.bad_threshold,
            self.ee_quota.degraded_threshold,
        )?;
        check_thresholds(
            "huawei",
            self.huawei.bad_threshold,
            self.huawei.degraded_threshold,
        )?;

        if self.huawei.signal_chars.is_empty() {
            return Err(ConfigError::Invalid(
                "huawei.signal_chars must not be empty".to_string(),
            ));
        }

        let url = url::Url::parse(&self.huawei.url).map_err(|e| {
            ConfigError::Invalid(format!("huawei.url {:?}: {}", self.huawei.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "huawei.url must be http or https, got {}",
                url.scheme()
            )));
        }

        Ok(())
    }
}

fn check_thresholds(section: &str, bad: f64, degraded: f64) -> Result<(), ConfigError> {
    if !bad.is_finite() || !degraded.is_finite() {
        return Err(ConfigError::Invalid(format!(
            "{section} thresholds must be finite numbers"
        )));
    }
    if bad > degraded {
        return Err(ConfigError::Invalid(format!(
            "{section}.bad_threshold ({bad}) exceeds degraded_threshold ({degraded})"
        )));
    }
    Ok(())
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR_NAME).join(CONFIG_FILENAME))
}
