use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::PluginError;

/// Server software families.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Paper,
    Spigot,
    Purpur,
    Fabric,
    Forge,
    Quilt,
    Vanilla,
    Velocity,
    BungeeCord,
}

impl Platform {
    pub const ALL: [Platform; 9] = [
        Platform::Paper,
        Platform::Spigot,
        Platform::Purpur,
        Platform::Fabric,
        Platform::Forge,
        Platform::Quilt,
        Platform::Vanilla,
        Platform::Velocity,
        Platform::BungeeCord,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Paper => "paper",
            Platform::Spigot => "spigot",
            Platform::Purpur => "purpur",
            Platform::Fabric => "fabric",
            Platform::Forge => "forge",
            Platform::Quilt => "quilt",
            Platform::Vanilla => "vanilla",
            Platform::Velocity => "velocity",
            Platform::BungeeCord => "bungeecord",
        }
    }

    /// Plugin types a server of this platform can load.
    pub fn allowed_plugin_types(&self) -> &'static [PluginType] {
        match self {
            Platform::Paper | Platform::Spigot | Platform::Purpur => &[PluginType::Bukkit],
            Platform::Fabric => &[PluginType::Fabric],
            // Quilt loads Fabric mods unchanged.
            Platform::Quilt => &[PluginType::Fabric],
            Platform::Forge => &[PluginType::Forge],
            Platform::Velocity => &[PluginType::Velocity],
            Platform::BungeeCord => &[PluginType::BungeeCord],
            Platform::Vanilla => &[],
        }
    }

    pub fn is_bukkit_family(&self) -> bool {
        matches!(self, Platform::Paper | Platform::Spigot | Platform::Purpur)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Platform::ALL
            .into_iter()
            .find(|p| p.as_str() == lowered)
            .ok_or_else(|| PluginError::UnknownPlatform(s.to_string()))
    }
}

/// Kind of plugin an archive identifies itself as, decided by its manifest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PluginType {
    Bukkit,
    BungeeCord,
    Velocity,
    Fabric,
    Forge,
}

impl std::fmt::Display for PluginType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginType::Bukkit => write!(f, "bukkit"),
            PluginType::BungeeCord => write!(f, "bungeecord"),
            PluginType::Velocity => write!(f, "velocity"),
            PluginType::Fabric => write!(f, "fabric"),
            PluginType::Forge => write!(f, "forge"),
        }
    }
}
