// ─── Modrinth ───
// Client for the Modrinth API v2.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::adapter::{fetch_json, SearchQuery, SourceAdapter};
use super::model::{
    PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, ReleaseChannel, SourceKind,
};
use crate::core::cache::{CacheKey, ResponseCache};
use crate::core::platform::Platform;

const MODRINTH_API_BASE: &str = "https://api.modrinth.com/v2";
const ADAPTER: &str = "modrinth";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    project_id: String,
    #[serde(default)]
    project_type: Option<String>,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    versions: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct Project {
    id: String,
    #[serde(default)]
    slug: String,
    #[serde(default)]
    project_type: Option<String>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    downloads: u64,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    license: Option<License>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    issues_url: Option<String>,
    #[serde(default)]
    wiki_url: Option<String>,
    #[serde(default)]
    published: String,
    #[serde(default)]
    updated: String,
    #[serde(default)]
    team: Option<String>,
}

#[derive(Debug, Deserialize)]
struct License {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Deserialize)]
struct TeamMember {
    user: TeamUser,
}

#[derive(Debug, Deserialize)]
struct TeamUser {
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct Version {
    id: String,
    #[serde(default)]
    version_number: String,
    #[serde(default)]
    game_versions: Vec<String>,
    #[serde(default)]
    files: Vec<VersionFile>,
    #[serde(default)]
    date_published: Option<String>,
    #[serde(default)]
    version_type: Option<String>,
    #[serde(default)]
    dependencies: Vec<VersionDependency>,
}

#[derive(Debug, Deserialize)]
struct VersionFile {
    url: String,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    hashes: FileHashes,
}

#[derive(Debug, Default, Deserialize)]
struct FileHashes {
    #[serde(default)]
    sha1: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionDependency {
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    version_id: Option<String>,
    #[serde(default)]
    dependency_type: String,
}

impl Version {
    fn primary_file(&self) -> Option<&VersionFile> {
        self.files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first())
    }

    fn into_plugin_version(self) -> PluginVersion {
        let (download_url, filename, file_size, sha1) = match self.primary_file() {
            Some(f) => (
                Some(f.url.clone()),
                f.filename.clone(),
                f.size,
                f.hashes.sha1.clone(),
            ),
            None => (None, None, 0, None),
        };
        let dependencies = self
            .dependencies
            .iter()
            .filter(|d| d.dependency_type == "required")
            .filter_map(|d| d.project_id.clone())
            .collect();

        PluginVersion {
            id: self.id,
            version_number: self.version_number,
            game_versions: self.game_versions,
            download_url,
            filename,
            release_date: self.date_published,
            channel: self
                .version_type
                .as_deref()
                .map(ReleaseChannel::from_label)
                .unwrap_or_default(),
            dependencies,
            file_size,
            sha1,
        }
    }
}

fn page_url(project_type: Option<&str>, slug: &str) -> String {
    format!(
        "https://modrinth.com/{}/{}",
        project_type.unwrap_or("plugin"),
        slug
    )
}

impl SearchHit {
    fn into_descriptor(self) -> PluginDescriptor {
        PluginDescriptor {
            page_url: page_url(self.project_type.as_deref(), &self.slug),
            id: self.project_id,
            name: self.title,
            description: self.description,
            author: self.author,
            downloads: self.downloads,
            rating: 0.0,
            source: SourceKind::Modrinth,
            categories: self.categories,
            game_versions: self.versions,
        }
    }
}

pub struct ModrinthSource {
    client: Client,
    base_url: String,
    cache: Arc<ResponseCache>,
}

impl ModrinthSource {
    pub fn new(client: Client, cache: Arc<ResponseCache>) -> Self {
        Self {
            client,
            base_url: MODRINTH_API_BASE.to_string(),
            cache,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Facet filter string, empty when nothing beyond the project type
    /// would be filtered on.
    fn build_facets(game_version: Option<&str>, platform: Option<Platform>) -> String {
        let project_type = match platform {
            Some(Platform::Fabric | Platform::Forge | Platform::Quilt) => "mod",
            _ => "plugin",
        };
        let mut parts = vec![format!(r#"["project_type:{}"]"#, project_type)];

        if let Some(version) = game_version {
            parts.push(format!(r#"["versions:{}"]"#, version));
        }
        if let Some(platform) = platform {
            let loader = if platform.is_bukkit_family() {
                "paper"
            } else {
                platform.as_str()
            };
            parts.push(format!(r#"["categories:{}"]"#, loader));
        }

        if parts.len() <= 1 {
            return String::new();
        }
        format!("[{}]", parts.join(","))
    }

    async fn fetch_team(&self, team_id: &str) -> Vec<String> {
        let url = format!("{}/team/{}/members", self.base_url, team_id);
        let members: Vec<TeamMember> =
            fetch_json("Modrinth team", self.client.get(&url)).await.unwrap_or_default();
        members
            .into_iter()
            .map(|m| m.user.username)
            .filter(|u| !u.is_empty())
            .collect()
    }
}

#[async_trait]
impl SourceAdapter for ModrinthSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Modrinth
    }

    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        let key = CacheKey::new(ADAPTER, "search")
            .param(&query.query)
            .opt_param(query.game_version.as_deref())
            .opt_param(query.platform)
            .param(query.limit);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let mut params = vec![
            ("query", query.query.clone()),
            ("limit", query.limit.to_string()),
        ];
        let facets = Self::build_facets(query.game_version.as_deref(), query.platform);
        if !facets.is_empty() {
            params.push(("facets", facets));
        }

        let request = self
            .client
            .get(format!("{}/search", self.base_url))
            .query(&params);
        let Some(response) = fetch_json::<SearchResponse>("Modrinth search", request).await else {
            return Vec::new();
        };

        let results: Vec<PluginDescriptor> = response
            .hits
            .into_iter()
            .map(SearchHit::into_descriptor)
            .collect();
        debug!("Modrinth search '{}' -> {} hits", query.query, results.len());
        self.cache.set(&key, &results);
        results
    }

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        let key = CacheKey::new(ADAPTER, "info").param(plugin_id);
        if let Some(cached) = self.cache.get(&key) {
            return Some(cached);
        }

        let url = format!("{}/project/{}", self.base_url, plugin_id);
        let project: Project = fetch_json("Modrinth project", self.client.get(&url)).await?;

        let authors = match project.team.as_deref() {
            Some(team) => self.fetch_team(team).await,
            None => Vec::new(),
        };

        let descriptor = PluginDescriptor {
            page_url: page_url(project.project_type.as_deref(), &project.slug),
            id: project.id,
            name: project.title,
            description: project.description,
            author: authors.first().cloned().unwrap_or_default(),
            downloads: project.downloads,
            rating: 0.0,
            source: SourceKind::Modrinth,
            categories: project.categories,
            game_versions: project.game_versions,
        };
        let info = PluginInfo {
            descriptor,
            long_description: project.body,
            authors,
            license: project.license.map(|l| l.id).unwrap_or_default(),
            source_url: project.source_url.unwrap_or_default(),
            issues_url: project.issues_url.unwrap_or_default(),
            wiki_url: project.wiki_url.unwrap_or_default(),
            created_at: project.published,
            updated_at: project.updated,
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

        let mut request = self
            .client
            .get(format!("{}/project/{}/version", self.base_url, plugin_id));
        if let Some(version) = game_version {
            request = request.query(&[("game_versions", format!(r#"["{}"]"#, version))]);
        }

        let Some(raw) = fetch_json::<Vec<Version>>("Modrinth versions", request).await else {
            return Vec::new();
        };
        let versions: Vec<PluginVersion> =
            raw.into_iter().map(Version::into_plugin_version).collect();

        self.cache.set(&key, &versions);
        versions
    }

    async fn get_download_url(&self, _plugin_id: &str, version: &PluginVersion) -> Option<String> {
        if let Some(url) = &version.download_url {
            return Some(url.clone());
        }
        let url = format!("{}/version/{}", self.base_url, version.id);
        let raw: Version = fetch_json("Modrinth version", self.client.get(&url)).await?;
        raw.primary_file().map(|f| f.url.clone())
    }

    async fn get_dependencies(
        &self,
        plugin_id: &str,
        game_version: Option<&str>,
    ) -> Vec<PluginDependency> {
        let key = CacheKey::new(ADAPTER, "dependencies")
            .param(plugin_id)
            .opt_param(game_version);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let versions = self.get_versions(plugin_id, game_version).await;
        let Some(latest) = versions.first() else {
            return Vec::new();
        };

        let url = format!("{}/version/{}", self.base_url, latest.id);
        let Some(raw) = fetch_json::<Version>("Modrinth dependencies", self.client.get(&url)).await
        else {
            return Vec::new();
        };

        let deps: Vec<PluginDependency> = raw
            .dependencies
            .into_iter()
            .filter_map(|d| {
                let project_id = d.project_id?;
                Some(PluginDependency {
                    name: project_id.clone(),
                    plugin_id: project_id,
                    required: d.dependency_type == "required",
                    version_range: d.version_id.unwrap_or_default(),
                    source: SourceKind::Modrinth,
                })
            })
            .collect();

        self.cache.set(&key, &deps);
        deps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{assert_fails_soft, http_stub, UNREACHABLE};

    #[test]
    fn facets_include_version_and_paper_loader() {
        let facets = ModrinthSource::build_facets(Some("1.20.1"), Some(Platform::Purpur));
        assert_eq!(
            facets,
            r#"[["project_type:plugin"],["versions:1.20.1"],["categories:paper"]]"#
        );
    }

    #[test]
    fn facets_empty_without_filters() {
        assert!(ModrinthSource::build_facets(None, None).is_empty());
    }

    #[test]
    fn facets_use_mod_project_type_for_mod_loaders() {
        let facets = ModrinthSource::build_facets(None, Some(Platform::Fabric));
        assert_eq!(facets, r#"[["project_type:mod"],["categories:fabric"]]"#);
    }

    #[test]
    fn search_hit_maps_to_descriptor() {
        let json = r#"{"hits": [{
            "project_id": "AANobbMI",
            "project_type": "plugin",
            "slug": "worldedit",
            "title": "WorldEdit",
            "description": "In-game map editor",
            "author": "EngineHub",
            "downloads": 5000,
            "categories": ["utility"],
            "versions": ["1.20.1", "1.20.4"]
        }]}"#;
        let response: SearchResponse = serde_json::from_str(json).unwrap();
        let descriptor = response.hits.into_iter().next().unwrap().into_descriptor();
        assert_eq!(descriptor.id, "AANobbMI");
        assert_eq!(descriptor.source, SourceKind::Modrinth);
        assert_eq!(descriptor.page_url, "https://modrinth.com/plugin/worldedit");
        assert_eq!(descriptor.game_versions.len(), 2);
    }

    #[test]
    fn version_uses_primary_file_and_required_dependencies() {
        let json = r#"{
            "id": "v1",
            "version_number": "7.3.0",
            "game_versions": ["1.20.1"],
            "version_type": "beta",
            "date_published": "2024-01-01T00:00:00Z",
            "files": [
                {"url": "https://cdn/extra.jar", "filename": "extra.jar", "size": 1, "primary": false},
                {"url": "https://cdn/main.jar", "filename": "main.jar", "size": 42, "primary": true,
                 "hashes": {"sha1": "abc"}}
            ],
            "dependencies": [
                {"project_id": "dep-a", "dependency_type": "required"},
                {"project_id": "dep-b", "dependency_type": "optional"}
            ]
        }"#;
        let version: Version = serde_json::from_str(json).unwrap();
        let mapped = version.into_plugin_version();
        assert_eq!(mapped.download_url.as_deref(), Some("https://cdn/main.jar"));
        assert_eq!(mapped.file_size, 42);
        assert_eq!(mapped.sha1.as_deref(), Some("abc"));
        assert_eq!(mapped.channel, ReleaseChannel::Beta);
        assert_eq!(mapped.dependencies, vec!["dep-a".to_string()]);
    }

    #[tokio::test]
    async fn registry_outage_yields_empty_results() {
        let erroring = http_stub(500, &[], "upstream down").await;
        for base in [erroring.as_str(), UNREACHABLE] {
            let modrinth = ModrinthSource::new(Client::new(), Arc::new(ResponseCache::disabled()))
                .with_base_url(base);
            assert_fails_soft(&modrinth, "AANobbMI").await;
        }
    }
}
