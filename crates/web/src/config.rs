//! Console configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File name of the config inside the data directory
pub const CONFIG_FILE: &str = "ui-config.toml";

/// Web console configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Listen host
    pub host: String,

    /// Listen port
    pub port: u16,

    /// Node-management executable
    pub pop_command: PathBuf,

    /// Directory served as the browser UI
    pub web_root: PathBuf,

    /// Lines fetched by `/api/logs` when no limit is given
    pub default_log_limit: u32,

    /// Open a browser once the server is up
    pub open_browser: bool,

    /// URLs fetched by the network part of the system check
    pub connectivity_urls: Vec<String>,

    /// Public IP lookup used by the system check; empty disables it
    pub public_ip_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8585,
            pop_command: PathBuf::from("tools/pop"),
            web_root: PathBuf::from("web"),
            default_log_limit: 100,
            open_browser: false,
            connectivity_urls: vec![
                "https://www.google.com".to_string(),
                "https://www.cloudflare.com".to_string(),
            ],
            public_ip_url: "https://api.ipify.org?format=json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn wizard_url(&self, token: &str) -> String {
        format!("{}/wizard?token={}", self.base_url(), token)
    }
}

/// Default config path for a data directory
pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}
