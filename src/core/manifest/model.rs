use serde::{Deserialize, Serialize};

use crate::core::platform::PluginType;

/// Canonical metadata read from an archive's embedded manifest. Where it
/// disagrees with a registry listing, this wins.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginMetadata {
    pub name: String,
    pub version: Option<String>,
    /// Entry-point class.
    pub main_class: Option<String>,
    pub api_version: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Hard dependencies.
    #[serde(default)]
    pub depend: Vec<String>,
    #[serde(default)]
    pub soft_depend: Vec<String>,
    #[serde(default)]
    pub load_before: Vec<String>,
    pub plugin_type: PluginType,
}

impl PluginMetadata {
    pub const UNKNOWN_NAME: &'static str = "Unknown";

    pub fn unnamed(plugin_type: PluginType) -> Self {
        Self {
            name: Self::UNKNOWN_NAME.to_string(),
            version: None,
            main_class: None,
            api_version: None,
            description: String::new(),
            authors: Vec::new(),
            depend: Vec::new(),
            soft_depend: Vec::new(),
            load_before: Vec::new(),
            plugin_type,
        }
    }
}
