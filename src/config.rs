//! `~/.esgtrack/config.toml` loading

use std::fs;
use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::services::insights::{InsightThresholds, DEFAULT_LAST_N};
use crate::services::periods::{PeriodOrder, DEFAULT_PERIOD_SEQUENCE};
use crate::types::{EsgError, Result};

pub const ESGTRACK_DIR_NAME: &str = ".esgtrack";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const API_URL_ENV: &str = "ESGTRACK_API_URL";

pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_INVOICES_PATH: &str = "/api/invoices";
pub const DEFAULT_METRICS_PATH: &str = "/api/esg-data";
pub const DEFAULT_INSIGHTS_PATH: &str = "/api/environmental-insights";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EsgConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub periods: PeriodConfig,
    #[serde(default)]
    pub insights: InsightConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_invoices_path")]
    pub invoices_path: String,
    #[serde(default = "default_metrics_path")]
    pub metrics_path: String,
    #[serde(default = "default_insights_path")]
    pub insights_path: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: default_timeout_secs(),
            invoices_path: default_invoices_path(),
            metrics_path: default_metrics_path(),
            insights_path: default_insights_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CacheConfig {
    /// Overrides `~/.esgtrack/cache`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodConfig {
    /// Canonical display order of billing-period labels
    #[serde(default = "default_sequence")]
    pub sequence: Vec<String>,
}

impl Default for PeriodConfig {
    fn default() -> Self {
        Self {
            sequence: default_sequence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightConfig {
    #[serde(default = "default_last_n")]
    pub last_n: usize,
    #[serde(default = "default_high_energy_kwh")]
    pub high_energy_kwh: f64,
    #[serde(default = "default_high_water_m3")]
    pub high_water_m3: f64,
}

impl Default for InsightConfig {
    fn default() -> Self {
        Self {
            last_n: default_last_n(),
            high_energy_kwh: default_high_energy_kwh(),
            high_water_m3: default_high_water_m3(),
        }
    }
}

impl EsgConfig {
    pub fn period_order(&self) -> PeriodOrder {
        PeriodOrder::new(&self.periods.sequence)
    }

    pub fn thresholds(&self) -> InsightThresholds {
        InsightThresholds {
            high_energy_kwh: self.insights.high_energy_kwh,
            high_water_m3: self.insights.high_water_m3,
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let base_dirs = BaseDirs::new()
        .ok_or_else(|| EsgError::Config("Cannot determine home directory".into()))?;
    Ok(base_dirs
        .home_dir()
        .join(ESGTRACK_DIR_NAME)
        .join(CONFIG_FILE_NAME))
}

/// Load config from `path` (or the default location), then apply the
/// `ESGTRACK_API_URL` override. A missing file yields defaults.
pub fn load_config(path: Option<&Path>) -> Result<EsgConfig> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    let config = load_file(&path)?;
    Ok(apply_env_override(config, std::env::var(API_URL_ENV).ok()))
}

pub fn load_file(path: &Path) -> Result<EsgConfig> {
    if !path.exists() {
        tracing::debug!(path = ?path, "no config file, using defaults");
        return Ok(EsgConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: EsgConfig = toml::from_str(&raw)
        .map_err(|e| EsgError::Config(format!("failed to parse {:?}: {}", path, e)))?;
    Ok(normalize_config(parsed))
}

pub fn apply_env_override(mut config: EsgConfig, api_url: Option<String>) -> EsgConfig {
    if let Some(url) = normalize_optional(api_url) {
        config.source.base_url = Some(url);
    }
    config
}

fn normalize_optional(input: Option<String>) -> Option<String> {
    input
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn normalize_config(mut config: EsgConfig) -> EsgConfig {
    config.source.base_url = normalize_optional(config.source.base_url.take());
    config.cache.dir = config
        .cache
        .dir
        .take()
        .filter(|dir| !dir.as_os_str().is_empty());

    for (path, fallback) in [
        (&mut config.source.invoices_path, DEFAULT_INVOICES_PATH),
        (&mut config.source.metrics_path, DEFAULT_METRICS_PATH),
        (&mut config.source.insights_path, DEFAULT_INSIGHTS_PATH),
    ] {
        let trimmed = path.trim();
        *path = if trimmed.is_empty() {
            fallback.to_owned()
        } else {
            trimmed.to_owned()
        };
    }

    config.periods.sequence = config
        .periods
        .sequence
        .into_iter()
        .map(|label| label.trim().to_owned())
        .filter(|label| !label.is_empty())
        .collect();
    if config.periods.sequence.is_empty() {
        config.periods.sequence = default_sequence();
    }

    if config.insights.last_n == 0 {
        config.insights.last_n = default_last_n();
    }

    config
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_invoices_path() -> String {
    DEFAULT_INVOICES_PATH.to_owned()
}

fn default_metrics_path() -> String {
    DEFAULT_METRICS_PATH.to_owned()
}

fn default_insights_path() -> String {
    DEFAULT_INSIGHTS_PATH.to_owned()
}

fn default_sequence() -> Vec<String> {
    DEFAULT_PERIOD_SEQUENCE.iter().map(|s| (*s).to_owned()).collect()
}

fn default_last_n() -> usize {
    DEFAULT_LAST_N
}

fn default_high_energy_kwh() -> f64 {
    InsightThresholds::default().high_energy_kwh
}

fn default_high_water_m3() -> f64 {
    InsightThresholds::default().high_water_m3
}
