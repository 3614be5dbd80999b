use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::server::ServerConfig;
use crate::core::error::{PluginError, PluginResult};

const APP_DIR_NAME: &str = "MinecraftServerManager";
const BOOTSTRAP_FILE: &str = "plugin_manager_bootstrap.json";
const SETTINGS_FILE: &str = "plugin_settings.json";
const CURSEFORGE_KEY_ENV: &str = "CURSEFORGE_API_KEY";

/// Persisted plugin engine settings. Every field has a default so partial
/// files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginSettings {
    pub curseforge_api_key: Option<String>,
    pub cache_ttl_secs: u64,
    pub request_timeout_secs: u64,
    pub download_timeout_secs: u64,
    pub search_limit: u32,
    pub server: ServerConfig,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            curseforge_api_key: None,
            cache_ttl_secs: 3600,
            request_timeout_secs: 15,
            download_timeout_secs: 120,
            search_limit: 20,
            server: ServerConfig::default(),
        }
    }
}

impl PluginSettings {
    /// Environment overrides on top of the stored values.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(CURSEFORGE_KEY_ENV) {
            if !key.trim().is_empty() {
                self.curseforge_api_key = Some(key);
            }
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BootstrapConfig {
    data_dir: PathBuf,
}

/// Data directory plus the settings stored in it.
pub struct AppState {
    pub data_dir: PathBuf,
    pub settings: PluginSettings,
}

impl AppState {
    /// Resolve the data directory (honouring the bootstrap redirect) and
    /// load settings from it.
    pub fn new() -> Self {
        Self::open(default_data_dir())
    }

    pub fn open(data_dir: PathBuf) -> Self {
        let settings = load_settings_from_disk(&data_dir)
            .unwrap_or_default()
            .with_env_overrides();
        Self { data_dir, settings }
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    pub fn save_settings(&self) -> PluginResult<()> {
        let path = self.settings_path();
        std::fs::create_dir_all(&self.data_dir).map_err(|e| PluginError::io(&self.data_dir, e))?;
        let json = serde_json::to_string_pretty(&self.settings)?;
        std::fs::write(&path, json).map_err(|e| PluginError::io(&path, e))
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn load_settings_from_disk(data_dir: &Path) -> Option<PluginSettings> {
    let path = data_dir.join(SETTINGS_FILE);
    let raw = std::fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => Some(settings),
        Err(e) => {
            warn!("Ignoring unreadable settings {:?}: {}", path, e);
            None
        }
    }
}

fn default_base_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("."))
}

fn default_data_dir() -> PathBuf {
    let base = default_base_dir();
    let bootstrap_path = base.join(BOOTSTRAP_FILE);

    if let Ok(raw) = std::fs::read_to_string(&bootstrap_path) {
        if let Ok(cfg) = serde_json::from_str::<BootstrapConfig>(&raw) {
            debug!("Data directory redirected to {:?}", cfg.data_dir);
            return cfg.data_dir;
        }
    }

    base.join(APP_DIR_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: PluginSettings =
            serde_json::from_str(r#"{"search_limit": 5, "server": {"platform": "velocity"}}"#)
                .unwrap();
        assert_eq!(settings.search_limit, 5);
        assert_eq!(settings.cache_ttl_secs, 3600);
        assert_eq!(settings.server.platform, "velocity");
        assert_eq!(settings.server.game_version, "1.20.4");
    }

    #[test]
    fn settings_survive_save_and_open() {
        let tmp = TempDir::new().unwrap();
        let mut state = AppState::open(tmp.path().to_path_buf());
        state.settings.server.game_version = "1.21".into();
        state.settings.download_timeout_secs = 30;
        state.save_settings().unwrap();

        let reopened = AppState::open(tmp.path().to_path_buf());
        assert_eq!(reopened.settings.server.game_version, "1.21");
        assert_eq!(reopened.settings.download_timeout_secs, 30);
    }

    #[test]
    fn corrupt_settings_fall_back_to_defaults() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(SETTINGS_FILE), "[").unwrap();
        let state = AppState::open(tmp.path().to_path_buf());
        assert_eq!(state.settings.search_limit, 20);
    }
}
