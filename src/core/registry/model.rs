use serde::{Deserialize, Serialize};

/// `source` value for plugins installed from a local file.
pub const MANUAL_SOURCE: &str = "manual";

/// One installed plugin, persisted in the registry file.
///
/// Every field has a default so registry files written by older or newer
/// versions still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InstalledPluginRecord {
    /// Unique within the registry, compared case-insensitively.
    pub name: String,
    pub version: String,
    /// `modrinth`, `hangar`, `spigotmc`, `curseforge` or `manual`.
    pub source: String,
    pub source_id: String,
    /// Archive name inside the plugin directory.
    pub filename: String,
    /// RFC 3339 install or last update time.
    pub installed_at: String,
    pub mc_version: String,
    pub auto_update: bool,
    pub dependencies: Vec<String>,
    pub file_size: u64,
    pub description: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha1: Option<String>,
}

impl InstalledPluginRecord {
    pub fn is_manual(&self) -> bool {
        self.source == MANUAL_SOURCE
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

/// On-disk layout of the registry file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryFile {
    pub plugins: Vec<InstalledPluginRecord>,
    pub server_type: String,
    pub mc_version: String,
    pub plugin_count: usize,
    pub last_updated: String,
}
