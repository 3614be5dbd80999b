use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::platform::Platform;

pub const REGISTRY_FILE: &str = "installed_plugins.json";
const BACKUP_DIR: &str = "backups";

/// Read-only view of the server the plugins are managed for. Owned by
/// whatever starts and stops the server process.
pub trait ServerConfigProvider: Send + Sync {
    fn platform_id(&self) -> &str;
    fn game_version(&self) -> &str;
}

/// Server identity plus where its plugins live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Platform identifier as configured, e.g. `paper`. Unknown values are
    /// kept verbatim.
    pub platform: String,
    pub game_version: String,
    pub plugins_dir: PathBuf,
    /// Defaults to `<plugins_dir>/backups`.
    pub backup_dir: Option<PathBuf>,
    /// Defaults to `installed_plugins.json` next to the plugin directory.
    pub registry_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            platform: Platform::Paper.to_string(),
            game_version: "1.20.4".to_string(),
            plugins_dir: PathBuf::from("plugins"),
            backup_dir: None,
            registry_path: None,
        }
    }
}

impl ServerConfig {
    pub fn new(
        platform: impl Into<String>,
        game_version: impl Into<String>,
        plugins_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            platform: platform.into(),
            game_version: game_version.into(),
            plugins_dir: plugins_dir.into(),
            backup_dir: None,
            registry_path: None,
        }
    }

    /// Snapshot another provider's identity onto a plugin directory.
    pub fn from_provider(provider: &dyn ServerConfigProvider, plugins_dir: impl Into<PathBuf>) -> Self {
        Self::new(provider.platform_id(), provider.game_version(), plugins_dir)
    }

    /// `None` for platforms this engine does not know.
    pub fn platform(&self) -> Option<Platform> {
        self.platform.parse().ok()
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.plugins_dir.join(BACKUP_DIR))
    }

    pub fn registry_path(&self) -> PathBuf {
        self.registry_path.clone().unwrap_or_else(|| {
            self.plugins_dir
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."))
                .join(REGISTRY_FILE)
        })
    }
}

impl ServerConfigProvider for ServerConfig {
    fn platform_id(&self) -> &str {
        &self.platform
    }

    fn game_version(&self) -> &str {
        &self.game_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_paths_follow_plugin_directory() {
        let config = ServerConfig::new("paper", "1.20.4", "/srv/mc/plugins");
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/mc/plugins/backups"));
        assert_eq!(
            config.registry_path(),
            PathBuf::from("/srv/mc/installed_plugins.json")
        );

        let relative = ServerConfig::new("paper", "1.20.4", "plugins");
        assert_eq!(relative.registry_path(), PathBuf::from("./installed_plugins.json"));
    }

    #[test]
    fn unknown_platform_is_kept_but_untyped() {
        let config = ServerConfig::new("Sponge", "1.12.2", "plugins");
        assert_eq!(config.platform_id(), "Sponge");
        assert!(config.platform().is_none());
        assert_eq!(ServerConfig::default().platform(), Some(Platform::Paper));
    }
}
