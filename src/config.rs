use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use anyhow::{Context, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Backend origin, e.g. `http://192.168.1.10:8000`
    pub base_url: String,
    /// `"all"` or a numeric camera id
    pub selected_camera: String,
    pub poll_interval_ms: u64,
    /// Offline cameras get a fresh reconnect every this many polls
    pub offline_recheck_ticks: u32,
    pub state_file: String,
    pub notification_history: usize,

    pub stream: StreamConfig,
    pub api: ApiConfig,
    pub websocket: WebSocketConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub load_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSocketConfig {
    pub path: String,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_ms: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            selected_camera: "all".to_string(),
            poll_interval_ms: 5000,
            offline_recheck_ticks: 1,
            state_file: "dashboard_state.json".to_string(),
            notification_history: 50,

            stream: StreamConfig::default(),
            api: ApiConfig::default(),
            websocket: WebSocketConfig::default(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 2000,
            load_timeout_ms: 5000,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay_ms: 1000,
            timeout_ms: 10000,
        }
    }
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            path: "/api/v1/ws".to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
        }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(config_str) => {
                let config: AppConfig = serde_json::from_str(&config_str)
                    .with_context(|| format!("invalid configuration in {}", path.display()))?;
                Ok(config)
            }
            Err(_) => {
                tracing::warn!("{} not found, using default configuration", path.display());
                Ok(AppConfig::default())
            }
        }
    }

    #[allow(dead_code)]
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Base URL without a trailing slash
    pub fn origin(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}
