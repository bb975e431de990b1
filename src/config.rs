use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{MESSAGES_TABLE, Tables, USERS_TABLE};
use crate::storage::ensure_parent_dir;

pub const DEFAULT_CONFIG_PATH: &str = "config/alumni.json";
pub const BACKEND_URL_ENV: &str = "ALUMNI_BACKEND_URL";
pub const ANON_KEY_ENV: &str = "ALUMNI_ANON_KEY";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend_url: String,
    pub anon_key: String,
    pub local_storage_path: String,
    pub toast_seconds: u64,
    pub users_table: String,
    pub messages_table: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            anon_key: String::new(),
            local_storage_path: "data/local_storage.db".to_string(),
            toast_seconds: 3,
            users_table: USERS_TABLE.to_string(),
            messages_table: MESSAGES_TABLE.to_string(),
        }
    }
}

impl AppConfig {
    pub fn toast_duration(&self) -> Duration {
        Duration::from_secs(self.toast_seconds.max(1))
    }

    pub fn tables(&self) -> Tables {
        Tables {
            users: self.users_table.clone(),
            messages: self.messages_table.clone(),
        }
    }

    pub fn has_backend(&self) -> bool {
        !self.backend_url.trim().is_empty() && !self.anon_key.trim().is_empty()
    }

    /// Environment variables win over the file.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(BACKEND_URL_ENV).filter(|value| !value.trim().is_empty()) {
            self.backend_url = url;
        }
        if let Some(key) = lookup(ANON_KEY_ENV).filter(|value| !value.trim().is_empty()) {
            self.anon_key = key;
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let mut config = match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    };
    config.apply_env(|name| std::env::var(name).ok());
    config
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    ensure_parent_dir(Path::new(path))?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
