// ─── SpigotMC ───
// Client for the Spiget mirror of SpigotMC resources.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use super::adapter::{fetch_json, SearchQuery, SourceAdapter};
use super::model::{PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, SourceKind};
use crate::core::cache::{CacheKey, ResponseCache};

const SPIGET_API_BASE: &str = "https://api.spiget.org/v2";
const ADAPTER: &str = "spigot";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Resource {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    author: Option<IdRef>,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    rating: Option<Rating>,
    #[serde(default)]
    category: Option<IdRef>,
    #[serde(default)]
    tested_versions: Vec<String>,
    #[serde(default)]
    release_date: Option<i64>,
    #[serde(default)]
    update_date: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct IdRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Rating {
    #[serde(default)]
    average: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceVersion {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default)]
    release_date: Option<i64>,
}

impl Resource {
    fn into_descriptor(self) -> PluginDescriptor {
        PluginDescriptor {
            id: self.id.to_string(),
            name: self.name,
            description: self.tag,
            author: self.author.map(|a| a.id.to_string()).unwrap_or_default(),
            downloads: self.downloads,
            rating: self.rating.map(|r| r.average).unwrap_or(0.0),
            source: SourceKind::SpigotMc,
            page_url: format!("https://www.spigotmc.org/resources/{}/", self.id),
            categories: self
                .category
                .map(|c| vec![c.id.to_string()])
                .unwrap_or_default(),
            game_versions: self.tested_versions,
        }
    }
}

pub struct SpigotSource {
    client: Client,
    base_url: String,
    cache: Arc<ResponseCache>,
}

impl SpigotSource {
    pub fn new(client: Client, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            base_url: SPIGET_API_BASE.to_string(),
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// The query is a path segment on Spiget, so it must be escaped.
    fn search_url(&self, query: &str) -> Option<Url> {
        let mut url = Url::parse(&format!("{}/search/resources", self.base_url)).ok()?;
        url.path_segments_mut().ok()?.push(query);
        Some(url)
    }

    fn version_download_url(&self, resource_id: &str, version_id: &str) -> String {
        format!(
            "{}/resources/{}/versions/{}/download",
            self.base_url, resource_id, version_id
        )
    }

    fn latest_download_url(&self, resource_id: &str) -> String {
        format!("{}/resources/{}/download", self.base_url, resource_id)
    }
}

#[async_trait]
impl SourceAdapter for SpigotSource {
    fn kind(&self) -> SourceKind {
        SourceKind::SpigotMc
    }

    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        let key = CacheKey::new(ADAPTER, "search")
            .param(&query.query)
            .param(query.limit);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let Some(url) = self.search_url(&query.query) else {
            return Vec::new();
        };
        let request = self
            .client
            .get(url)
            .query(&[("size", query.limit.to_string()), ("sort", "-downloads".into())]);
        let Some(resources) = fetch_json::<Vec<Resource>>("Spiget search", request).await else {
            return Vec::new();
        };

        let results: Vec<PluginDescriptor> =
            resources.into_iter().map(Resource::into_descriptor).collect();
        debug!("Spiget search '{}' -> {} hits", query.query, results.len());
        self.cache.set(&key, &results);
        results
    }

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        let key = CacheKey::new(ADAPTER, "info").param(plugin_id);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let url = format!("{}/resources/{}", self.base_url, plugin_id);
        let resource: Resource = fetch_json("Spiget resource", self.client.get(&url)).await?;
        let created_at = resource
            .release_date
            .map(|t| t.to_string())
            .unwrap_or_default();
        let updated_at = resource
            .update_date
            .map(|t| t.to_string())
            .unwrap_or_default();

        let mut info = PluginInfo::from_descriptor(resource.into_descriptor());
        info.authors = vec![info.descriptor.author.clone()];
        info.created_at = created_at;
        info.updated_at = updated_at;

        self.cache.set(&key, &info);
        Some(info)
    }

    /// Spiget does not filter by game version.
    async fn get_versions(
        &self,
        plugin_id: &str,
        _game_version: Option<&str>,
    ) -> Vec<PluginVersion> {
        let key = CacheKey::new(ADAPTER, "versions").param(plugin_id);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let request = self
            .client
            .get(format!("{}/resources/{}/versions", self.base_url, plugin_id))
            .query(&[("size", "25"), ("sort", "-releaseDate")]);
        let Some(raw) = fetch_json::<Vec<ResourceVersion>>("Spiget versions", request).await
        else {
            return Vec::new();
        };

        let versions: Vec<PluginVersion> = raw
            .into_iter()
            .map(|v| {
                let id = v.id.to_string();
                PluginVersion {
                    download_url: Some(self.version_download_url(plugin_id, &id)),
                    id,
                    version_number: v.name,
                    release_date: v.release_date.map(|t| t.to_string()),
                    ..PluginVersion::default()
                }
            })
            .collect();

        self.cache.set(&key, &versions);
        versions
    }

    async fn get_download_url(&self, plugin_id: &str, version: &PluginVersion) -> Option<String> {
        if let Some(url) = &version.download_url {
            return Some(url.clone());
        }
        if version.id.is_empty() || version.id == "latest" {
            return Some(self.latest_download_url(plugin_id));
        }
        Some(self.version_download_url(plugin_id, &version.id))
    }

    /// Spiget publishes no dependency data; real dependencies surface from
    /// the archive manifest after download.
    async fn get_dependencies(
        &self,
        _plugin_id: &str,
        _game_version: Option<&str>,
    ) -> Vec<PluginDependency> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{assert_fails_soft, http_stub, UNREACHABLE};

    fn source() -> SpigotSource {
        SpigotSource::new(Client::new(), Arc::new(ResponseCache::disabled()))
    }

    #[test]
    fn search_query_is_escaped_as_path_segment() {
        let url = source().search_url("world edit/7").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.spiget.org/v2/search/resources/world%20edit%2F7"
        );
    }

    #[test]
    fn resource_maps_to_descriptor() {
        let json = r#"[{
            "id": 13932,
            "name": "WorldEdit",
            "tag": "In-game editor",
            "author": {"id": 1},
            "downloads": 900,
            "rating": {"average": 4.5},
            "category": {"id": 22},
            "testedVersions": ["1.20"]
        }]"#;
        let resources: Vec<Resource> = serde_json::from_str(json).unwrap();
        let d = resources.into_iter().next().unwrap().into_descriptor();
        assert_eq!(d.id, "13932");
        assert_eq!(d.author, "1");
        assert_eq!(d.rating, 4.5);
        assert_eq!(d.categories, vec!["22".to_string()]);
        assert_eq!(d.page_url, "https://www.spigotmc.org/resources/13932/");
    }

    #[tokio::test]
    async fn download_url_falls_back_to_latest_endpoint() {
        let version = PluginVersion::default();
        let url = source().get_download_url("13932", &version).await;
        assert_eq!(
            url.as_deref(),
            Some("https://api.spiget.org/v2/resources/13932/download")
        );
    }

    #[tokio::test]
    async fn registry_outage_yields_empty_results() {
        let erroring = http_stub(503, &[], "maintenance").await;
        for base in [erroring.as_str(), UNREACHABLE] {
            assert_fails_soft(&source().with_base_url(base), "13932").await;
        }
    }
}
