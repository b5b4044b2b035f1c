use std::{fs, path::Path, path::PathBuf, time::Duration};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::scraping::allevents_html::{DEFAULT_CITY, DEFAULT_SOURCE};

pub const DEFAULT_MAX_DAYS_AHEAD: i64 = 30;
pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 1000;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;
const DEFAULT_USER_AGENT: &str = "allevents-crawl/0.1";
const DATA_DIR_NAME: &str = "allevents-crawl";
const CONFIG_FILE: &str = "config.json";

/// Per-user directory holding `config.json` and the event database.
pub fn data_root() -> PathBuf {
    dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DATA_DIR_NAME)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrawlConfig {
    pub city: String,
    pub source: String,
    pub max_days_ahead: i64,
    /// Crawl-wide ceiling on dispatched fetches, listing and detail pages together.
    pub max_pages: usize,
    pub request_delay_ms: u64,
    pub max_in_flight: usize,
    pub user_agent: String,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            city: DEFAULT_CITY.to_string(),
            source: DEFAULT_SOURCE.to_string(),
            max_days_ahead: DEFAULT_MAX_DAYS_AHEAD,
            max_pages: DEFAULT_MAX_PAGES,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CrawlConfig {
    /// Reads `config.json` from the data directory, falling back to defaults.
    pub fn load() -> Result<Self> {
        read_config(&data_root().join(CONFIG_FILE))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

pub fn read_config(path: &Path) -> Result<CrawlConfig> {
    if !path.exists() {
        return Ok(CrawlConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("unable to read config {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("invalid config {}", path.display()))
}
