// ─── Hangar ───
// Client for the PaperMC Hangar API v1.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::LOCATION;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, error};

use super::adapter::{fetch_json, SearchQuery, SourceAdapter};
use super::model::{
    PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, ReleaseChannel, SourceKind,
};
use crate::core::cache::{CacheKey, ResponseCache};
use crate::core::platform::Platform;

const HANGAR_API_BASE: &str = "https://hangar.papermc.io/api/v1";
const ADAPTER: &str = "hangar";

#[derive(Debug, Deserialize)]
struct ProjectPage {
    #[serde(default)]
    result: Vec<Project>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Project {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: Namespace,
    #[serde(default)]
    stats: Stats,
    #[serde(default)]
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    last_updated: String,
    #[serde(default)]
    settings: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct Namespace {
    #[serde(default)]
    owner: String,
    #[serde(default)]
    slug: String,
}

#[derive(Debug, Default, Deserialize)]
struct Stats {
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    stars: f64,
}

#[derive(Debug, Deserialize)]
struct VersionPage {
    #[serde(default)]
    result: Vec<Version>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Version {
    #[serde(default)]
    name: String,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    channel: Option<Channel>,
    #[serde(default)]
    plugin_dependencies: HashMap<String, Vec<HangarDependency>>,
    #[serde(default)]
    platform_dependencies: HashMap<String, Vec<String>>,
    #[serde(default)]
    downloads: HashMap<String, PlatformDownload>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct HangarDependency {
    #[serde(default)]
    name: String,
    #[serde(default)]
    required: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformDownload {
    #[serde(default)]
    file_info: Option<FileInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    size_bytes: u64,
}

impl Project {
    fn into_descriptor(self) -> PluginDescriptor {
        PluginDescriptor {
            page_url: format!(
                "https://hangar.papermc.io/{}/{}",
                self.namespace.owner, self.namespace.slug
            ),
            id: self.namespace.slug,
            name: self.name,
            description: self.description,
            author: self.namespace.owner,
            downloads: self.stats.downloads,
            rating: self.stats.stars,
            source: SourceKind::Hangar,
            categories: vec![self.category],
            game_versions: Vec::new(),
        }
    }
}

impl Version {
    fn game_versions(&self) -> Vec<String> {
        let unique: BTreeSet<&String> = self.platform_dependencies.values().flatten().collect();
        unique.into_iter().cloned().collect()
    }

    fn into_plugin_version(self, platform_key: &str) -> PluginVersion {
        let game_versions = self.game_versions();
        let dependencies = self
            .plugin_dependencies
            .values()
            .flatten()
            .filter(|d| d.required && !d.name.is_empty())
            .map(|d| d.name.clone())
            .collect();
        let file = self
            .downloads
            .get(platform_key)
            .and_then(|d| d.file_info.as_ref());

        PluginVersion {
            id: self.name.clone(),
            version_number: self.name,
            game_versions,
            download_url: None,
            filename: file.and_then(|f| f.name.clone()),
            release_date: self.created_at,
            channel: self
                .channel
                .map(|c| ReleaseChannel::from_label(&c.name))
                .unwrap_or_default(),
            dependencies,
            file_size: file.map(|f| f.size_bytes).unwrap_or(0),
            sha1: None,
        }
    }
}

fn settings_str(settings: &serde_json::Value, path: &[&str]) -> String {
    let mut node = settings;
    for segment in path {
        node = &node[*segment];
    }
    node.as_str().unwrap_or_default().to_string()
}

pub struct HangarSource {
    client: Client,
    probe_client: Client,
    base_url: String,
    cache: Arc<ResponseCache>,
    /// Hangar platform segment used for downloads (PAPER, VELOCITY, WATERFALL).
    platform_key: &'static str,
}

impl HangarSource {
    pub fn new(client: Client, probe_client: Client, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            probe_client,
            base_url: HANGAR_API_BASE.to_string(),
            cache,
            platform_key: "PAPER",
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_platform(mut self, platform: Option<Platform>) -> Self {
        self.platform_key = Self::platform_key(platform);
        self
    }

    fn platform_key(platform: Option<Platform>) -> &'static str {
        match platform {
            Some(Platform::Velocity) => "VELOCITY",
            Some(Platform::BungeeCord) => "WATERFALL",
            _ => "PAPER",
        }
    }

    fn download_endpoint(&self, slug: &str, version_name: &str) -> String {
        format!(
            "{}/projects/{}/versions/{}/{}/download",
            self.base_url, slug, version_name, self.platform_key
        )
    }
}

#[async_trait]
impl SourceAdapter for HangarSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Hangar
    }

    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        let key = CacheKey::new(ADAPTER, "search")
            .param(&query.query)
            .opt_param(query.game_version.as_deref())
            .param(query.limit);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut params = vec![
            ("q", query.query.clone()),
            ("limit", query.limit.to_string()),
            ("sort", "-downloads".to_string()),
        ];
        if let Some(version) = &query.game_version {
            params.push(("version", version.clone()));
        }

        let request = self
            .client
            .get(format!("{}/projects", self.base_url))
            .query(&params);
        let Some(page) = fetch_json::<ProjectPage>("Hangar search", request).await else {
            return Vec::new();
        };

        let results: Vec<PluginDescriptor> =
            page.result.into_iter().map(Project::into_descriptor).collect();
        debug!("Hangar search '{}' -> {} hits", query.query, results.len());
        self.cache.set(&key, &results);
        results
    }

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        let key = CacheKey::new(ADAPTER, "info").param(plugin_id);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let url = format!("{}/projects/{}", self.base_url, plugin_id);
        let project: Project = fetch_json("Hangar project", self.client.get(&url)).await?;

        let license = settings_str(&project.settings, &["license", "type"]);
        let source_url = settings_str(&project.settings, &["links", "source"]);
        let issues_url = settings_str(&project.settings, &["links", "issues"]);
        let wiki_url = settings_str(&project.settings, &["links", "wiki"]);
        let long_description = project.description.clone();
        let created_at = project.created_at.clone();
        let updated_at = project.last_updated.clone();
        let descriptor = project.into_descriptor();

        let info = PluginInfo {
            authors: vec![descriptor.author.clone()],
            descriptor,
            long_description,
            license,
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
        let key = CacheKey::new(ADAPTER, "versions")
            .param(plugin_id)
            .opt_param(game_version);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut params = vec![("limit", "25".to_string())];
        if let Some(version) = game_version {
            params.push(("platformVersion", version.to_string()));
        }
        let request = self
            .client
            .get(format!("{}/projects/{}/versions", self.base_url, plugin_id))
            .query(&params);

        let Some(page) = fetch_json::<VersionPage>("Hangar versions", request).await else {
            return Vec::new();
        };
        let versions: Vec<PluginVersion> = page
            .result
            .into_iter()
            .map(|v| v.into_plugin_version(self.platform_key))
            .collect();

        self.cache.set(&key, &versions);
        versions
    }

    /// Hangar versions carry no direct link: probe the download endpoint
    /// without following redirects and use its `Location`.
    async fn get_download_url(&self, plugin_id: &str, version: &PluginVersion) -> Option<String> {
        if let Some(url) = &version.download_url {
            return Some(url.clone());
        }

        let url = self.download_endpoint(plugin_id, &version.id);
        match self.probe_client.head(&url).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                if matches!(status, 200 | 301 | 302 | 303 | 307 | 308) {
                    if let Some(location) = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|v| v.to_str().ok())
                    {
                        return Some(location.to_string());
                    }
                }
            }
            Err(e) => error!("Hangar download URL error: {}", e),
        }
        // The endpoint itself serves the file when no redirect is offered.
        Some(url)
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
            .map(|name| PluginDependency {
                name: name.clone(),
                plugin_id: name.clone(),
                required: true,
                version_range: String::new(),
                source: SourceKind::Hangar,
            })
            .collect()
    }
}
