//! Client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Client configuration, loaded from a TOML file with per-field defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// WebSocket endpoint of the answer service.
    #[serde(default = "default_chat_url")]
    pub chat_url: String,

    /// Base URL of the document store API.
    #[serde(default = "default_docstore_url")]
    pub docstore_url: String,

    /// Seconds to wait for a terminal event after submitting a query.
    /// 0 waits indefinitely.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Seconds to wait for the WebSocket connection to open.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Buffer size for the inbound event channel.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

fn default_chat_url() -> String {
    "ws://localhost:8000/ws/chat".to_string()
}

fn default_docstore_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_query_timeout_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_event_buffer_size() -> usize {
    256
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chat_url: default_chat_url(),
            docstore_url: default_docstore_url(),
            query_timeout_secs: default_query_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Default config file location (`<user config dir>/paperchat/config.toml`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("paperchat").join("config.toml"))
    }
}
