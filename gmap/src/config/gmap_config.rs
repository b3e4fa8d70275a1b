use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GmapConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory served by `/json/{file}/`
    #[serde(default = "default_json_dir")]
    pub json_dir: String,

    /// A link whose newest report is older than this is reported idle
    #[serde(default = "default_link_alive_interval_secs")]
    pub link_alive_interval_secs: u64,

    /// Max number of reports fed into the sparkline and traffic charts
    #[serde(default = "default_traffic_max_values")]
    pub traffic_max_values: u64,

    /// Reports per sliding window on the sparkline charts
    #[serde(default = "default_sparkline_window")]
    pub sparkline_window: usize,

    /// Dashboard refresh period
    #[serde(default = "default_bw_update_interval_secs")]
    pub bw_update_interval_secs: u64,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log directory for file-based logging; stdout when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    #[serde(default = "default_log_file")]
    pub log_file: String,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_database_path() -> String {
    "data/gmap.sqlite".to_string()
}

fn default_json_dir() -> String {
    "json".to_string()
}

fn default_link_alive_interval_secs() -> u64 {
    5
}

fn default_traffic_max_values() -> u64 {
    200
}

fn default_sparkline_window() -> usize {
    2
}

fn default_bw_update_interval_secs() -> u64 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "gmap.log".to_string()
}

impl Default for GmapConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            json_dir: default_json_dir(),
            link_alive_interval_secs: default_link_alive_interval_secs(),
            traffic_max_values: default_traffic_max_values(),
            sparkline_window: default_sparkline_window(),
            bw_update_interval_secs: default_bw_update_interval_secs(),
            log_level: default_log_level(),
            log_dir: None,
            log_file: default_log_file(),
        }
    }
}

impl GmapConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: GmapConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Like [`GmapConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn link_alive_interval(&self) -> anyhow::Result<TimeDelta> {
        i64::try_from(self.link_alive_interval_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "link_alive_interval_secs out of range: {}",
                    self.link_alive_interval_secs
                )
            })
    }
}
