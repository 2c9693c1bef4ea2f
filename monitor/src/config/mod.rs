//! Configuration management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    /// Collection cycle interval
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProbeConfig {
    /// Use the simulated probe instead of real network requests
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_connectivity_url")]
    pub connectivity_url: String,
    #[serde(default = "default_connectivity_timeout_ms")]
    pub connectivity_timeout_ms: u64,
    /// Number of reachability requests per cycle; latency, jitter and packet
    /// loss are derived from this burst
    #[serde(default = "default_ping_samples")]
    pub ping_samples: u32,
    #[serde(default = "default_download_url")]
    pub download_url: String,
    #[serde(default = "default_download_timeout_ms")]
    pub download_timeout_ms: u64,
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default = "default_upload_bytes")]
    pub upload_bytes: usize,
    #[serde(default = "default_upload_timeout_ms")]
    pub upload_timeout_ms: u64,
    /// Total speed-test attempts per cycle (not extra retries)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_speed_drop_mbps")]
    pub speed_drop_mbps: f64,
    #[serde(default = "default_speed_drop_percent")]
    pub speed_drop_percent: f64,
    /// Improvement thresholds fall back to the drop thresholds when unset
    #[serde(default)]
    pub speed_improve_mbps: Option<f64>,
    #[serde(default)]
    pub speed_improve_percent: Option<f64>,
    #[serde(default = "default_max_realistic_download_mbps")]
    pub max_realistic_download_mbps: f64,
    #[serde(default = "default_max_realistic_upload_mbps")]
    pub max_realistic_upload_mbps: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalyticsConfig {
    /// Downtime proxy for rows that carry no duration of their own
    #[serde(default = "default_fallback_interval_ms")]
    pub fallback_interval_ms: i64,
    #[serde(default = "default_max_drop_events")]
    pub max_drop_events: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    #[serde(default = "default_base_download_mbps")]
    pub base_download_mbps: f64,
    #[serde(default = "default_base_upload_mbps")]
    pub base_upload_mbps: f64,
    #[serde(default = "default_base_latency_ms")]
    pub base_latency_ms: f64,
    /// Chance per cycle that the simulated link is down, 0.0..=1.0
    #[serde(default = "default_outage_probability")]
    pub outage_probability: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_interval_ms() -> u64 {
    60_000
}

fn default_database_path() -> String {
    "linkpulse.db".to_string()
}

fn default_connectivity_url() -> String {
    "https://www.gstatic.com/generate_204".to_string()
}

fn default_connectivity_timeout_ms() -> u64 {
    5_000
}

fn default_ping_samples() -> u32 {
    4
}

fn default_download_url() -> String {
    "https://speed.cloudflare.com/__down?bytes=10000000".to_string()
}

fn default_download_timeout_ms() -> u64 {
    30_000
}

fn default_upload_url() -> String {
    "https://speed.cloudflare.com/__up".to_string()
}

fn default_upload_bytes() -> usize {
    2_000_000
}

fn default_upload_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    2_000
}

fn default_speed_drop_mbps() -> f64 {
    10.0
}

fn default_speed_drop_percent() -> f64 {
    25.0
}

fn default_max_realistic_download_mbps() -> f64 {
    1_000.0
}

fn default_max_realistic_upload_mbps() -> f64 {
    500.0
}

fn default_fallback_interval_ms() -> i64 {
    60_000
}

fn default_max_drop_events() -> usize {
    50
}

fn default_base_download_mbps() -> f64 {
    95.0
}

fn default_base_upload_mbps() -> f64 {
    35.0
}

fn default_base_latency_ms() -> f64 {
    18.0
}

fn default_outage_probability() -> f64 {
    0.02
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            database_path: default_database_path(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            simulate: false,
            connectivity_url: default_connectivity_url(),
            connectivity_timeout_ms: default_connectivity_timeout_ms(),
            ping_samples: default_ping_samples(),
            download_url: default_download_url(),
            download_timeout_ms: default_download_timeout_ms(),
            upload_url: default_upload_url(),
            upload_bytes: default_upload_bytes(),
            upload_timeout_ms: default_upload_timeout_ms(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            speed_drop_mbps: default_speed_drop_mbps(),
            speed_drop_percent: default_speed_drop_percent(),
            speed_improve_mbps: None,
            speed_improve_percent: None,
            max_realistic_download_mbps: default_max_realistic_download_mbps(),
            max_realistic_upload_mbps: default_max_realistic_upload_mbps(),
        }
    }
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            fallback_interval_ms: default_fallback_interval_ms(),
            max_drop_events: default_max_drop_events(),
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            base_download_mbps: default_base_download_mbps(),
            base_upload_mbps: default_base_upload_mbps(),
            base_latency_ms: default_base_latency_ms(),
            outage_probability: default_outage_probability(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to built-in defaults when the file does
    /// not exist (first run, or `--simulate` without a config).
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            info!("Config file {:?} not found, using defaults", path.as_ref());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.interval_ms == 0 {
            anyhow::bail!("general.interval_ms must be greater than zero");
        }
        if self.probe.max_retries == 0 {
            anyhow::bail!("probe.max_retries must be at least 1");
        }
        if self.probe.ping_samples == 0 {
            anyhow::bail!("probe.ping_samples must be at least 1");
        }
        if self.thresholds.max_realistic_download_mbps <= 0.0
            || self.thresholds.max_realistic_upload_mbps <= 0.0
        {
            anyhow::bail!("realism ceilings must be positive");
        }
        if !(0.0..=1.0).contains(&self.simulation.outage_probability) {
            anyhow::bail!("simulation.outage_probability must be within 0.0..=1.0");
        }
        Ok(())
    }
}

impl ThresholdsConfig {
    pub fn improve_mbps(&self) -> f64 {
        self.speed_improve_mbps.unwrap_or(self.speed_drop_mbps)
    }

    pub fn improve_percent(&self) -> f64 {
        self.speed_improve_percent.unwrap_or(self.speed_drop_percent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.general.interval_ms, 60_000);
        assert_eq!(config.probe.max_retries, 3);
        assert_eq!(config.thresholds.speed_drop_percent, 25.0);
        assert_eq!(config.analytics.max_drop_events, 50);
        assert!(!config.probe.simulate);
        config.validate().unwrap();
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [probe]
            max_retries = 5
            simulate = true

            [thresholds]
            speed_drop_mbps = 20.0
            speed_improve_mbps = 30.0
            "#,
        )
        .unwrap();

        assert_eq!(config.probe.max_retries, 5);
        assert!(config.probe.simulate);
        assert_eq!(config.probe.retry_delay_ms, 2_000);
        assert_eq!(config.thresholds.improve_mbps(), 30.0);
        // unset improvement percent falls back to the drop percent
        assert_eq!(config.thresholds.improve_percent(), 25.0);
    }

    #[test]
    fn validation_rejects_zero_retries() {
        let config: Config = toml::from_str("[probe]\nmax_retries = 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
