use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const BASE_URL_ENV: &str = "CHATTERBOX_BASE_URL";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the chat service; requests go to `{base_url}/chat`
    pub base_url: String,

    /// Timeout handed to the HTTP client, in seconds
    pub request_timeout_secs: u64,

    /// Chatterbox home directory (storage, logs)
    pub home: PathBuf,

    /// UI preferences
    pub ui: UiConfig,
}

/// UI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub show_session_id: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            show_session_id: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        Config {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 60,
            home: home.join(".chatterbox"),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from `~/.chatterbox/config.toml`, then apply the environment
    pub fn load() -> Result<Self> {
        let home = dirs::home_dir()
            .context("Could not find home directory")?
            .join(".chatterbox");
        Self::load_from(&home)
    }

    /// Load configuration rooted at an explicit home directory
    pub fn load_from(home: &Path) -> Result<Self> {
        fs::create_dir_all(home).context("Failed to create .chatterbox directory")?;

        let config_path = home.join("config.toml");
        let mut config = if config_path.exists() {
            let content =
                fs::read_to_string(&config_path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")?
        } else {
            Config::default()
        };

        config.home = home.to_path_buf();
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }

        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        fs::create_dir_all(&self.home).context("Failed to create .chatterbox directory")?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(self.config_path(), content).context("Failed to write config file")?;
        Ok(())
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Key-value storage backing the session id
    pub fn storage_path(&self) -> PathBuf {
        self.home.join("storage.json")
    }

    pub fn log_path(&self) -> PathBuf {
        self.home.join("chatterbox.log")
    }

    /// Full URL of the chat endpoint
    pub fn chat_url(&self) -> String {
        format!("{}/chat", self.base_url.trim_end_matches('/'))
    }

    pub fn set_base_url(&mut self, url: String) {
        self.base_url = url;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_url_tolerates_trailing_slash() {
        let mut config = Config::default();
        config.set_base_url("https://bot.example.com/".to_string());
        assert_eq!(config.chat_url(), "https://bot.example.com/chat");
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.toml"),
            "request_timeout_secs = 5\n[ui]\nshow_session_id = false\n",
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();
        assert_eq!(config.request_timeout_secs, 5);
        assert!(!config.ui.show_session_id);
        assert_eq!(config.home, dir.path());
        assert_eq!(config.storage_path(), dir.path().join("storage.json"));
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.home = dir.path().to_path_buf();
        config.request_timeout_secs = 12;
        config.save().unwrap();

        let loaded = Config::load_from(dir.path()).unwrap();
        assert_eq!(loaded.request_timeout_secs, 12);
    }
}
