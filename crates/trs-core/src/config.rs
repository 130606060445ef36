//! Application configuration management.
//!
//! Holds the backend URL override, the token storage backend and the last
//! username used to log in. Stored at `~/.config/trs/config.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::auth::{FileTokenStore, KeyringTokenStore, MemoryTokenStore, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "trs";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Backend used in production
const PRODUCTION_URL_PREFIX: &str = "https://trs.pythonanywhere.com";

/// Backend used when `TRS_ENV=development`
const DEVELOPMENT_URL_PREFIX: &str = "http://localhost:8000";

/// Path segment all API routes live under
const API_PATH: &str = "api";

/// Environment variable overriding the backend URL prefix
pub const API_URL_ENV: &str = "TRS_API_URL";

/// Environment variable selecting development defaults
pub const ENV_ENV: &str = "TRS_ENV";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Nothing is persisted
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Backend URL prefix, without the `/api` suffix
    pub api_url: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
    pub last_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Resolve the API base URL from the environment, then the config file,
    /// then the built-in default.
    pub fn api_base_url(&self) -> String {
        let env_url = std::env::var(API_URL_ENV).ok();
        let development = std::env::var(ENV_ENV)
            .map(|v| v.eq_ignore_ascii_case("development"))
            .unwrap_or(false);
        self.resolve_base_url(env_url.as_deref(), development)
    }

    fn resolve_base_url(&self, env_url: Option<&str>, development: bool) -> String {
        let prefix = env_url
            .filter(|url| !url.trim().is_empty())
            .map(str::to_string)
            .or_else(|| self.api_url.clone())
            .unwrap_or_else(|| {
                if development {
                    DEVELOPMENT_URL_PREFIX.to_string()
                } else {
                    PRODUCTION_URL_PREFIX.to_string()
                }
            });

        let prefix = prefix.trim_end_matches('/');
        if prefix.ends_with(&format!("/{}", API_PATH)) {
            prefix.to_string()
        } else {
            format!("{}/{}", prefix, API_PATH)
        }
    }

    /// Build the token store selected by `storage`
    pub fn token_store(&self) -> Result<Arc<dyn TokenStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileTokenStore::new(self.cache_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringTokenStore::new()),
            StorageBackend::Memory => Arc::new(MemoryTokenStore::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_precedence() {
        let mut config = Config::default();
        assert_eq!(
            config.resolve_base_url(None, false),
            "https://trs.pythonanywhere.com/api"
        );
        assert_eq!(
            config.resolve_base_url(None, true),
            "http://localhost:8000/api"
        );

        config.api_url = Some("https://records.example.edu/".to_string());
        assert_eq!(
            config.resolve_base_url(None, true),
            "https://records.example.edu/api"
        );
        assert_eq!(
            config.resolve_base_url(Some("http://127.0.0.1:9000/api/"), false),
            "http://127.0.0.1:9000/api"
        );
        assert_eq!(
            config.resolve_base_url(Some("  "), false),
            "https://records.example.edu/api"
        );
    }

    #[test]
    fn test_config_defaults_from_partial_file() {
        let config: Config = serde_json::from_str(r#"{"last_username":"alice"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.api_url, None);
        assert_eq!(config.last_username.as_deref(), Some("alice"));

        let config: Config = serde_json::from_str(r#"{"storage":"keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
    }

    #[test]
    fn test_memory_backend_builds_without_dirs() {
        let config = Config {
            storage: StorageBackend::Memory,
            ..Config::default()
        };
        let store = config.token_store().unwrap();
        assert_eq!(store.get("auth-token").unwrap(), None);
    }
}
