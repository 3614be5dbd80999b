// ─── CurseForge ───
// Client for the CurseForge API v1. Requires an API key; without one the
// adapter reports itself unavailable and answers every call with nothing.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::debug;

use super::adapter::{fetch_json, SearchQuery, SourceAdapter};
use super::model::{
    PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, ReleaseChannel, SourceKind,
};
use crate::core::cache::{CacheKey, ResponseCache};
use crate::core::platform::Platform;

const CURSEFORGE_API_BASE: &str = "https://api.curseforge.com/v1";
const ADAPTER: &str = "curseforge";
const GAME_ID_MINECRAFT: u32 = 432;
const CLASS_ID_MODS: u32 = 6;
const SORT_FIELD_POPULARITY: u32 = 2;
const RELATION_REQUIRED: u32 = 3;
const HASH_ALGO_SHA1: u32 = 1;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mod {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    authors: Vec<Named>,
    #[serde(default)]
    categories: Vec<Named>,
    #[serde(default)]
    download_count: f64,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    links: Links,
    #[serde(default)]
    date_created: String,
    #[serde(default)]
    date_modified: String,
}

#[derive(Debug, Deserialize)]
struct Named {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Links {
    #[serde(default)]
    website_url: Option<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    issues_url: Option<String>,
    #[serde(default)]
    wiki_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModFile {
    id: u64,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    download_url: Option<String>,
    #[serde(default)]
    file_date: Option<String>,
    #[serde(default)]
    release_type: Option<u32>,
    #[serde(default)]
    dependencies: Vec<FileDependency>,
    #[serde(default)]
    file_length: u64,
    #[serde(default)]
    hashes: Vec<FileHash>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileDependency {
    mod_id: u64,
    relation_type: u32,
}

#[derive(Debug, Deserialize)]
struct FileHash {
    value: String,
    algo: u32,
}

impl Mod {
    fn into_descriptor(self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id.to_string(),
            name: self.name,
            description: self.summary,
            author: self
                .authors
                .first()
                .map(|a| a.name.clone())
                .unwrap_or_default(),
            downloads: self.download_count.max(0.0) as u64,
            rating: self.rating.unwrap_or(0.0),
            source: SourceKind::CurseForge,
            page_url: self.links.website_url.unwrap_or_default(),
            categories: self.categories.into_iter().map(|c| c.name).collect(),
            game_versions: Vec::new(),
        }
    }
}

impl ModFile {
    fn into_plugin_version(self) -> PluginVersion {
        let channel = match self.release_type {
            Some(2) => ReleaseChannel::Beta,
            Some(3) => ReleaseChannel::Alpha,
            _ => ReleaseChannel::Release,
        };
        let dependencies = self
            .dependencies
            .iter()
            .filter(|d| d.relation_type == RELATION_REQUIRED)
            .map(|d| d.mod_id.to_string())
            .collect();
        let sha1 = self
            .hashes
            .iter()
            .find(|h| h.algo == HASH_ALGO_SHA1)
            .map(|h| h.value.clone());

        PluginVersion {
            id: self.id.to_string(),
            version_number: self
                .display_name
                .clone()
                .or_else(|| self.file_name.clone())
                .unwrap_or_default(),
            game_versions: self.game_versions,
            download_url: self.download_url,
            filename: self.file_name,
            release_date: self.file_date,
            channel,
            dependencies,
            file_size: self.file_length,
            sha1,
        }
    }
}

fn mod_loader_type(platform: Option<Platform>) -> Option<u32> {
    match platform? {
        Platform::Forge => Some(1),
        Platform::Fabric => Some(4),
        Platform::Quilt => Some(5),
        _ => None,
    }
}

pub struct CurseForgeSource {
    client: Client,
    base_url: String,
    cache: Arc<ResponseCache>,
    api_key: Option<String>,
}

impl CurseForgeSource {
    pub fn new(client: Client, cache: Arc<ResponseCache>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: CURSEFORGE_API_BASE.to_string(),
            cache,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get(&self, path: &str) -> Option<RequestBuilder> {
        let key = self.api_key.as_deref()?;
        Some(
            self.client
                .get(format!("{}{}", self.base_url, path))
                .header("x-api-key", key),
        )
    }
}

#[async_trait]
impl SourceAdapter for CurseForgeSource {
    fn kind(&self) -> SourceKind {
        SourceKind::CurseForge
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        let Some(request) = self.get("/mods/search") else {
            debug!("CurseForge API key not set, skipping search");
            return Vec::new();
        };

        let key = CacheKey::new(ADAPTER, "search")
            .param(&query.query)
            .opt_param(query.game_version.as_deref())
            .opt_param(query.platform)
            .param(query.limit);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut params = vec![
            ("gameId", GAME_ID_MINECRAFT.to_string()),
            ("searchFilter", query.query.clone()),
            ("pageSize", query.limit.to_string()),
            ("sortField", SORT_FIELD_POPULARITY.to_string()),
            ("sortOrder", "desc".to_string()),
            ("classId", CLASS_ID_MODS.to_string()),
        ];
        if let Some(version) = &query.game_version {
            params.push(("gameVersion", version.clone()));
        }
        if let Some(loader) = mod_loader_type(query.platform) {
            params.push(("modLoaderType", loader.to_string()));
        }

        let Some(envelope) =
            fetch_json::<Envelope<Vec<Mod>>>("CurseForge search", request.query(&params)).await
        else {
            return Vec::new();
        };

        let results: Vec<PluginDescriptor> =
            envelope.data.into_iter().map(Mod::into_descriptor).collect();
        self.cache.set(&key, &results);
        results
    }

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        let request = self.get(&format!("/mods/{}", plugin_id))?;
        let key = CacheKey::new(ADAPTER, "info").param(plugin_id);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let envelope: Envelope<Mod> = fetch_json("CurseForge mod", request).await?;
        let raw = envelope.data;
        let authors: Vec<String> = raw.authors.iter().map(|a| a.name.clone()).collect();
        let source_url = raw.links.source_url.clone().unwrap_or_default();
        let issues_url = raw.links.issues_url.clone().unwrap_or_default();
        let wiki_url = raw.links.wiki_url.clone().unwrap_or_default();
        let created_at = raw.date_created.clone();
        let updated_at = raw.date_modified.clone();

        let info = PluginInfo {
            descriptor: raw.into_descriptor(),
            long_description: String::new(),
            authors,
            license: String::new(),
            source_url,
            issues_url,
            wiki_url,
            created_at,
            updated_at,
        };
        self.cache.set(&key, &info);
        Some(info)
    }

    async fn get_versions(
        &self,
        plugin_id: &str,
        game_version: Option<&str>,
    ) -> Vec<PluginVersion> {
        let Some(request) = self.get(&format!("/mods/{}/files", plugin_id)) else {
            return Vec::new();
        };
        let key = CacheKey::new(ADAPTER, "versions")
            .param(plugin_id)
            .opt_param(game_version);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut params = vec![("pageSize", "25".to_string())];
        if let Some(version) = game_version {
            params.push(("gameVersion", version.to_string()));
        }

        let Some(envelope) =
            fetch_json::<Envelope<Vec<ModFile>>>("CurseForge files", request.query(&params)).await
        else {
            return Vec::new();
        };
        let versions: Vec<PluginVersion> = envelope
            .data
            .into_iter()
            .map(ModFile::into_plugin_version)
            .collect();

        self.cache.set(&key, &versions);
        versions
    }

    /// Authors can opt out of third-party distribution, in which case the
    /// file payload has no link and the dedicated endpoint must be asked.
    async fn get_download_url(&self, plugin_id: &str, version: &PluginVersion) -> Option<String> {
        if !self.is_available() {
            return None;
        }
        if let Some(url) = &version.download_url {
            return Some(url.clone());
        }
        let request = self.get(&format!("/mods/{}/files/{}/download-url", plugin_id, version.id))?;
        let envelope: Envelope<Option<String>> =
            fetch_json("CurseForge download URL", request).await?;
        envelope.data
    }

    async fn get_dependencies(
        &self,
        plugin_id: &str,
        game_version: Option<&str>,
    ) -> Vec<PluginDependency> {
        let versions = self.get_versions(plugin_id, game_version).await;
        let Some(latest) = versions.first() else {
            return Vec::new();
        };
        latest
            .dependencies
            .iter()
            .map(|id| PluginDependency {
                name: id.clone(),
                plugin_id: id.clone(),
                required: true,
                version_range: String::new(),
                source: SourceKind::CurseForge,
            })
            .collect()
    }
}
