use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const BACKEND_ENV: &str = "MAIL_ORACLE_BACKEND";

fn default_base_url() -> String {
    "http://127.0.0.1:5000/api".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_results() -> u32 {
    10
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Whole-request timeout. Queries wait on the backend's AI call, so keep it generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct QueryConfig {
    #[serde(default = "default_max_results")]
    pub default_max_results: u32,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct NotificationConfig {
    /// Mirror in-window toasts to the desktop notification center.
    #[serde(default)]
    pub desktop: bool,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct UiConfig {
    #[serde(default)]
    pub show_activity: bool,
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        WindowConfig {
            width: 900,
            height: 760,
            min_width: 520,
            min_height: 420,
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            default_max_results: default_max_results(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            backend: BackendConfig::default(),
            window: WindowConfig::default(),
            query: QueryConfig::default(),
            notifications: NotificationConfig::default(),
            ui: UiConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        let config_path = Self::get_config_path();

        let mut config = if config_path.exists() {
            match fs::read_to_string(&config_path) {
                Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                    eprintln!("Error parsing config.toml: {}. Using defaults.", e);
                    Config::default()
                }),
                Err(e) => {
                    eprintln!("Error reading config.toml: {}. Using defaults.", e);
                    Config::default()
                }
            }
        } else {
            // Create config directory if it doesn't exist
            if let Some(parent) = config_path.parent() {
                let _ = fs::create_dir_all(parent);
            }
            Config::default()
        };

        config.apply_env_override(std::env::var(BACKEND_ENV).ok());
        config
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_override(&mut self, base_url: Option<String>) {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.backend.base_url = url.trim().to_string();
        }
    }

    pub fn get_config_path() -> PathBuf {
        Self::get_config_dir().join("config.toml")
    }

    pub fn get_config_dir() -> PathBuf {
        if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home).join(".config/mail-oracle")
        } else {
            PathBuf::from(".")
        }
    }
}
