use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::error::PluginError;

/// The four external registries plugins can be acquired from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceKind {
    #[serde(rename = "modrinth")]
    Modrinth,
    #[serde(rename = "hangar")]
    Hangar,
    #[serde(rename = "spigotmc")]
    SpigotMc,
    #[serde(rename = "curseforge")]
    CurseForge,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Modrinth,
        SourceKind::Hangar,
        SourceKind::SpigotMc,
        SourceKind::CurseForge,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Modrinth => "modrinth",
            SourceKind::Hangar => "hangar",
            SourceKind::SpigotMc => "spigotmc",
            SourceKind::CurseForge => "curseforge",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.as_str() == lowered)
            .ok_or_else(|| PluginError::UnknownSource(s.to_string()))
    }
}

/// Normalized search result. Ephemeral; lives at most as long as the
/// response cache entry that produced it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub downloads: u64,
    pub rating: f64,
    pub source: SourceKind,
    pub page_url: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub game_versions: Vec<String>,
}

impl PluginDescriptor {
    /// Minimal descriptor for a plugin known only by id and name.
    pub fn bare(source: SourceKind, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            author: String::new(),
            downloads: 0,
            rating: 0.0,
            source,
            page_url: String::new(),
            categories: Vec::new(),
            game_versions: Vec::new(),
        }
    }

    /// Key identifying this plugin within an install chain.
    pub fn chain_key(&self) -> String {
        format!("{}:{}", self.source, self.id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseChannel {
    #[default]
    Release,
    Beta,
    Alpha,
}

impl ReleaseChannel {
    /// Free-form registry channel names fold onto the three known channels.
    pub fn from_label(label: &str) -> Self {
        let lowered = label.to_ascii_lowercase();
        if lowered.contains("alpha") || lowered.contains("snapshot") {
            ReleaseChannel::Alpha
        } else if lowered.contains("beta") {
            ReleaseChannel::Beta
        } else {
            ReleaseChannel::Release
        }
    }
}

/// One downloadable version of a plugin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PluginVersion {
    pub id: String,
    pub version_number: String,
    #[serde(default)]
    pub game_versions: Vec<String>,
    /// Absent when the registry needs a secondary call to produce a link.
    pub download_url: Option<String>,
    pub filename: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub channel: ReleaseChannel,
    /// Source ids of required dependencies.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub file_size: u64,
    pub sha1: Option<String>,
}

/// Detailed plugin information.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginInfo {
    #[serde(flatten)]
    pub descriptor: PluginDescriptor,
    pub long_description: String,
    pub authors: Vec<String>,
    pub license: String,
    pub source_url: String,
    pub issues_url: String,
    pub wiki_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl PluginInfo {
    pub fn from_descriptor(descriptor: PluginDescriptor) -> Self {
        Self {
            descriptor,
            long_description: String::new(),
            authors: Vec::new(),
            license: String::new(),
            source_url: String::new(),
            issues_url: String::new(),
            wiki_url: String::new(),
            created_at: String::new(),
            updated_at: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginDependency {
    pub name: String,
    pub plugin_id: String,
    pub required: bool,
    /// Constraint string reported by the registry, if any.
    pub version_range: String,
    pub source: SourceKind,
}
