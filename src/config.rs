//! Service configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    pub upstream: UpstreamConfig,
    pub downstream: DownstreamConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream API base URL
    pub base_url: String,

    /// Basic-auth username
    pub username: String,

    /// Basic-auth password
    pub password: String,

    /// Endpoint listing the campaign's events, relative to the base URL
    #[serde(default = "default_campaign_endpoint")]
    pub campaign_endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownstreamConfig {
    /// Downstream REST API base URL
    pub base_url: String,

    /// Application name used as the basic-auth username
    pub application_name: String,

    /// API key used as the basic-auth password
    pub api_key: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Seconds between sync passes
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

// Defaults
fn default_db_path() -> PathBuf {
    PathBuf::from("rostersync.db")
}
fn default_campaign_endpoint() -> String {
    "/events".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_interval_secs() -> u64 {
    300
}
