use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::dependencies::{DependencyInstaller, DependencyResolver, InstallChain};
use super::fetch::{file_sha1, ArchiveFetcher, DownloadProgress, HttpArchiveFetcher};
use super::locks::NameLocks;
use super::outcome::OperationResult;
use super::transaction::{InstallContext, InstallRequest, InstallTransaction};
use crate::core::cache::ResponseCache;
use crate::core::error::{PluginError, PluginResult};
use crate::core::http::{build_http_client, build_probe_client};
use crate::core::platform::Platform;
use crate::core::registry::{BackupStore, InstalledPluginRecord, Registry, MANUAL_SOURCE};
use crate::core::search::{AggregateSearch, PlatformSourceTable};
use crate::core::sources::{
    PluginDescriptor, PluginInfo, PluginVersion, SearchQuery, SourceKind, SourceSet,
};
use crate::core::state::{PluginSettings, ServerConfig};
use crate::core::validator::{ValidationResult, Validator};
use crate::core::version::VersionResolver;

const NAME_SEARCH_LIMIT: u32 = 5;
const DEFAULT_SEARCH_LIMIT: u32 = 20;
/// Two installs whose dependencies point at each other would otherwise wait
/// on each other forever.
const DEPENDENCY_LOCK_WAIT: Duration = Duration::from_secs(120);

/// What to install: a name to look up, or a search result picked already.
#[derive(Debug, Clone)]
pub enum InstallTarget {
    Name(String),
    Descriptor(PluginDescriptor),
}

impl From<&str> for InstallTarget {
    fn from(name: &str) -> Self {
        InstallTarget::Name(name.to_string())
    }
}

impl From<String> for InstallTarget {
    fn from(name: String) -> Self {
        InstallTarget::Name(name)
    }
}

impl From<PluginDescriptor> for InstallTarget {
    fn from(descriptor: PluginDescriptor) -> Self {
        InstallTarget::Descriptor(descriptor)
    }
}

/// Entry point for every plugin operation on one server.
pub struct PluginManager {
    ctx: InstallContext,
    sources: SourceSet,
    search: AggregateSearch,
    cache: Arc<ResponseCache>,
    server: ServerConfig,
    locks: NameLocks,
    search_limit: u32,
}

impl PluginManager {
    pub async fn new(
        server: ServerConfig,
        sources: SourceSet,
        fetcher: Arc<dyn ArchiveFetcher>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let plugins_dir = server.plugins_dir().to_path_buf();
        let registry = Registry::load(
            server.registry_path(),
            &plugins_dir,
            &server.platform,
            &server.game_version,
        )
        .await;

        let ctx = InstallContext {
            versions: VersionResolver::new(sources.clone()),
            dependencies: DependencyResolver::new(sources.clone()),
            fetcher,
            registry: Mutex::new(registry),
            validator: Validator::new(&server.platform, &server.game_version, &plugins_dir),
            backups: BackupStore::new(server.backup_dir()),
            plugins_dir,
            game_version: server.game_version.clone(),
        };

        info!(
            "Plugin manager ready: {} {} ({:?})",
            server.platform,
            server.game_version,
            server.plugins_dir()
        );

        Self {
            ctx,
            search: AggregateSearch::new(sources.clone(), PlatformSourceTable::default()),
            sources,
            cache,
            server,
            locks: NameLocks::new(),
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Manager over the four public registries, configured from settings.
    pub async fn from_settings(
        settings: &PluginSettings,
        progress: Option<UnboundedSender<DownloadProgress>>,
    ) -> PluginResult<Self> {
        let api_timeout = Duration::from_secs(settings.request_timeout_secs);
        let client = build_http_client(api_timeout)?;
        let probe_client = build_probe_client(api_timeout)?;
        let download_client =
            build_http_client(Duration::from_secs(settings.download_timeout_secs))?;

        let cache = Arc::new(ResponseCache::new(Duration::from_secs(
            settings.cache_ttl_secs,
        )));
        let sources = SourceSet::standard(
            client,
            probe_client,
            cache.clone(),
            settings.server.platform(),
            settings.curseforge_api_key.clone(),
        );

        let mut fetcher = HttpArchiveFetcher::new(download_client);
        if let Some(sender) = progress {
            fetcher = fetcher.with_progress(sender);
        }

        let manager = Self::new(settings.server.clone(), sources, Arc::new(fetcher), cache)
            .await
            .with_search_limit(settings.search_limit);
        Ok(manager)
    }

    pub fn with_table(mut self, table: PlatformSourceTable) -> Self {
        self.search = AggregateSearch::new(self.sources.clone(), table);
        self
    }

    pub fn with_search_limit(mut self, limit: u32) -> Self {
        self.search_limit = limit;
        self
    }

    pub fn server(&self) -> &ServerConfig {
        &self.server
    }

    // ── Discovery ───────────────────────────────────────

    /// Search the registries that fit `platform` (the server's by default).
    pub async fn search(
        &self,
        query: &str,
        platform: Option<Platform>,
        game_version: Option<&str>,
        limit: Option<u32>,
    ) -> Vec<PluginDescriptor> {
        let query = self.query(query, platform, game_version, limit);
        self.search.search(&query).await
    }

    /// Search exactly the given registries.
    pub async fn search_in(
        &self,
        kinds: &[SourceKind],
        query: &str,
        game_version: Option<&str>,
        limit: Option<u32>,
    ) -> Vec<PluginDescriptor> {
        let query = self.query(query, None, game_version, limit);
        self.search.search_in(kinds, &query).await
    }

    fn query(
        &self,
        query: &str,
        platform: Option<Platform>,
        game_version: Option<&str>,
        limit: Option<u32>,
    ) -> SearchQuery {
        SearchQuery::new(query)
            .platform(platform.or_else(|| self.server.platform()))
            .game_version(Some(game_version.unwrap_or(&self.server.game_version)))
            .limit(limit.unwrap_or(self.search_limit))
    }

    pub async fn info(&self, source: SourceKind, plugin_id: &str) -> Option<PluginInfo> {
        self.sources.get(source)?.get_info(plugin_id).await
    }

    /// Versions for the server's game version, newest first.
    pub async fn versions(&self, source: SourceKind, plugin_id: &str) -> Vec<PluginVersion> {
        match self.sources.get(source) {
            Some(adapter) => {
                adapter
                    .get_versions(plugin_id, Some(&self.server.game_version))
                    .await
            }
            None => Vec::new(),
        }
    }

    // ── Lifecycle ───────────────────────────────────────

    /// Install a plugin and, when asked, its required dependencies.
    ///
    /// A name is searched with a small limit; the first result wins unless
    /// `preferred_source` names a registry with a hit.
    pub async fn install(
        &self,
        target: impl Into<InstallTarget>,
        explicit_version: Option<&str>,
        auto_dependencies: bool,
        preferred_source: Option<SourceKind>,
    ) -> OperationResult {
        let plugin = match target.into() {
            InstallTarget::Descriptor(descriptor) => descriptor,
            InstallTarget::Name(name) => match self.find(&name, preferred_source).await {
                Some(found) => found,
                None => {
                    return OperationResult::fail(
                        format!("Plugin not found: {}", name),
                        "No search results",
                    )
                }
            },
        };

        let _guard = self.locks.acquire(&plugin.name).await;
        let mut chain = InstallChain::new(&plugin);
        let request = InstallRequest {
            plugin,
            explicit_version: explicit_version.map(str::to_string),
            auto_dependencies,
        };
        InstallTransaction::new(&self.ctx)
            .run(&request, self, &mut chain)
            .await
    }

    async fn find(&self, name: &str, preferred: Option<SourceKind>) -> Option<PluginDescriptor> {
        let mut kinds = self.search.table().sources_for(self.server.platform()).to_vec();
        if let Some(kind) = preferred {
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        let query = self.query(name, None, None, Some(NAME_SEARCH_LIMIT));
        let results = self.search.search_in(&kinds, &query).await;

        let preferred_hit = preferred
            .and_then(|kind| results.iter().find(|r| r.source == kind))
            .cloned();
        preferred_hit.or_else(|| results.into_iter().next())
    }

    /// Replace an installed plugin with its source's newest version.
    pub async fn update(&self, name: &str) -> OperationResult {
        let _guard = self.locks.acquire(name).await;
        let Some(record) = self.record(name).await else {
            return OperationResult::fail(format!("{} is not installed", name), "Not installed");
        };
        if record.is_manual() {
            return OperationResult::fail(
                format!("Cannot update manually installed plugin {}", record.name),
                "No source information",
            );
        }
        let Ok(source) = record.source.parse::<SourceKind>() else {
            return OperationResult::fail(
                format!("Cannot update {}", record.name),
                PluginError::UnknownSource(record.source.clone()).to_string(),
            );
        };

        let versions = self.versions(source, &record.source_id).await;
        let Some(latest) = versions.first() else {
            return OperationResult::fail(
                format!("No versions found for {}", record.name),
                "Empty version list",
            );
        };
        if latest.version_number == record.version {
            return OperationResult::ok(format!("{} is already up to date", record.name))
                .with_detail("version", &record.version);
        }

        info!(
            "Updating {} from {} to {}",
            record.name, record.version, latest.version_number
        );
        let mut plugin = PluginDescriptor::bare(source, &record.source_id, &record.name);
        plugin.description = record.description.clone();
        plugin.author = record.author.clone();

        let mut chain = InstallChain::new(&plugin);
        let request = InstallRequest {
            plugin,
            explicit_version: Some(latest.id.clone()),
            auto_dependencies: false,
        };
        let mut result = InstallTransaction::new(&self.ctx)
            .run(&request, self, &mut chain)
            .await;
        if result.success {
            let version = result
                .detail_str("version")
                .unwrap_or(latest.version_number.as_str())
                .to_string();
            result.message = format!(
                "Updated {} from v{} to v{}",
                record.name, record.version, version
            );
        }
        result.with_detail("previous_version", &record.version)
    }

    /// Installed plugins whose source lists a different newest version,
    /// mapped to that version.
    pub async fn check_updates(&self) -> BTreeMap<String, String> {
        let records = match self.list().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read registry: {}", e);
                return BTreeMap::new();
            }
        };

        let mut updates = BTreeMap::new();
        for record in records.iter().filter(|r| !r.is_manual()) {
            let Ok(source) = record.source.parse::<SourceKind>() else {
                continue;
            };
            let versions = self.versions(source, &record.source_id).await;
            if let Some(latest) = versions.first() {
                if latest.version_number != record.version {
                    info!(
                        "Update available for {}: {} -> {}",
                        record.name, record.version, latest.version_number
                    );
                    updates.insert(record.name.clone(), latest.version_number.clone());
                }
            }
        }
        updates
    }

    /// Validate a local `.jar`, copy it into the plugin directory and
    /// register it with source `manual`.
    pub async fn install_from_file(&self, path: &Path) -> OperationResult {
        let is_jar = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("jar"))
            .unwrap_or(false);
        if !is_jar {
            return OperationResult::fail("Only .jar files are supported", "Invalid file type");
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return OperationResult::fail(
                format!("File not found: {}", path.display()),
                "File not found",
            );
        }

        let validation = self.validate(path).await;
        if !validation.is_valid {
            let errors = validation.error_summary();
            return OperationResult::fail(format!("Validation failed: {}", errors), errors)
                .with_detail("issues", &validation.issues);
        }
        let Some(meta) = validation.metadata.clone() else {
            return OperationResult::fail("Could not read plugin metadata", "No metadata");
        };

        let Some(file_name) = path.file_name() else {
            return OperationResult::fail("Invalid file path", "No file name");
        };
        let filename = file_name.to_string_lossy().to_string();
        let dest = self.ctx.plugins_dir.join(&filename);

        let lock_name = {
            let registry = self.ctx.registry.lock().await;
            replaced_record(&registry, &meta.name, &filename)
                .map(|r| r.name.clone())
                .unwrap_or_else(|| meta.name.clone())
        };
        let _guard = self.locks.acquire(&lock_name).await;

        let mut registry = self.ctx.registry.lock().await;
        let existing = replaced_record(&registry, &meta.name, &filename).cloned();
        let mut backup = None;
        if let Some(record) = &existing {
            let current = registry.archive_path(record);
            match self.ctx.backups.backup(&current, &record.name, &record.version).await {
                Ok(taken) => backup = taken,
                Err(e) => {
                    return OperationResult::fail(
                        format!("Could not back up current {}", record.name),
                        e.to_string(),
                    )
                }
            }
        }

        if let Err(e) = copy_into(path, &dest).await {
            return OperationResult::fail(format!("Could not copy {}", filename), e.to_string());
        }

        let version = meta.version.clone().unwrap_or_else(|| "unknown".to_string());
        let file_size = tokio::fs::metadata(&dest).await.map(|m| m.len()).unwrap_or(0);
        if let Some(old) = existing.as_ref().filter(|r| !r.matches_name(&meta.name)) {
            info!("{} replaces {} at {}", meta.name, old.name, filename);
            registry.remove(&old.name);
        }
        registry.upsert(InstalledPluginRecord {
            name: meta.name.clone(),
            version: version.clone(),
            source: MANUAL_SOURCE.to_string(),
            source_id: String::new(),
            filename: filename.clone(),
            installed_at: Utc::now().to_rfc3339(),
            mc_version: self.server.game_version.clone(),
            auto_update: false,
            dependencies: meta.depend.clone(),
            file_size,
            description: meta.description.clone(),
            author: meta.authors.join(", "),
            sha1: file_sha1(&dest).await.ok(),
        });
        if let Err(e) = registry.save().await {
            registry.remove(&meta.name);
            if let Some(old) = existing {
                registry.upsert(old);
            }
            return OperationResult::fail(
                format!("Could not register {}", meta.name),
                e.to_string(),
            );
        }

        if let Some(old) = existing.as_ref().filter(|r| !r.filename.eq_ignore_ascii_case(&filename)) {
            let stale = registry.archive_path(old);
            if let Err(e) = tokio::fs::remove_file(&stale).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Could not remove replaced archive {:?}: {}", stale, e);
                }
            }
        }

        info!("Installed {} v{} from {:?}", meta.name, version, path);
        OperationResult::ok(format!("Installed {} v{} from file", meta.name, version))
            .with_detail("name", &meta.name)
            .with_detail("version", &version)
            .with_detail("filename", &filename)
            .with_detail("warnings", validation.warning_messages())
            .with_detail("backup", backup)
    }

    /// Back up and delete a plugin's archive, then drop its record.
    pub async fn uninstall(&self, name: &str) -> OperationResult {
        let _guard = self.locks.acquire(name).await;
        let mut registry = self.ctx.registry.lock().await;
        if let Err(e) = registry.reconcile().await {
            warn!("Registry reconciliation failed: {}", e);
        }
        match registry.uninstall(name, &self.ctx.backups).await {
            Ok(backup) => {
                OperationResult::ok(format!("Uninstalled {}", name)).with_detail("backup", backup)
            }
            Err(PluginError::NotInstalled(_)) => {
                OperationResult::fail(format!("{} is not installed", name), "Not installed")
            }
            Err(e) => OperationResult::fail(format!("Failed to uninstall {}", name), e.to_string()),
        }
    }

    /// Put the newest backup of `name` back in the plugin directory.
    pub async fn restore_latest_backup(&self, name: &str) -> OperationResult {
        let _guard = self.locks.acquire(name).await;
        let dest = {
            let registry = self.ctx.registry.lock().await;
            match registry.get(name) {
                Some(record) => registry.archive_path(record),
                None => self.ctx.plugins_dir.join(format!(
                    "{}.jar",
                    crate::core::registry::safe_name(name)
                )),
            }
        };
        match self.ctx.backups.restore_latest(name, &dest).await {
            Ok(Some(backup)) => OperationResult::ok(format!("Restored {}", name))
                .with_detail("backup", backup)
                .with_detail("path", dest),
            Ok(None) => OperationResult::fail(format!("No backups found for {}", name), "No backup"),
            Err(e) => OperationResult::fail(format!("Failed to restore {}", name), e.to_string()),
        }
    }

    // ── Inspection ──────────────────────────────────────

    pub async fn list(&self) -> PluginResult<Vec<InstalledPluginRecord>> {
        self.ctx.registry.lock().await.list().await
    }

    pub async fn validate(&self, archive: &Path) -> ValidationResult {
        let validator = self.ctx.validator.clone();
        let archive_path = archive.to_path_buf();
        match tokio::task::spawn_blocking(move || validator.validate(&archive_path)).await {
            Ok(result) => result,
            Err(e) => {
                let mut result = ValidationResult::new(archive.display().to_string());
                result.add_error(format!("Validation task failed: {}", e), "");
                result
            }
        }
    }

    pub async fn validate_all(&self) -> Vec<ValidationResult> {
        let validator = self.ctx.validator.clone();
        tokio::task::spawn_blocking(move || validator.validate_all())
            .await
            .unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Response cache cleared");
    }

    async fn record(&self, name: &str) -> Option<InstalledPluginRecord> {
        let mut registry = self.ctx.registry.lock().await;
        if let Err(e) = registry.reconcile().await {
            warn!("Registry reconciliation failed: {}", e);
        }
        registry.get(name).cloned()
    }
}

#[async_trait]
impl DependencyInstaller for PluginManager {
    async fn is_installed(&self, source: SourceKind, source_id: &str) -> bool {
        self.ctx
            .registry
            .lock()
            .await
            .contains_source_id(source.as_str(), source_id)
    }

    async fn install_dependency(
        &self,
        plugin: PluginDescriptor,
        chain: &mut InstallChain,
    ) -> OperationResult {
        let name = plugin.name.clone();
        let guard = if chain.hold(&name) {
            match self.locks.acquire_within(&name, DEPENDENCY_LOCK_WAIT).await {
                Some(guard) => Some(guard),
                None => {
                    chain.release(&name);
                    warn!("Gave up waiting for {} held by another operation", name);
                    return OperationResult::fail(
                        format!("{} is busy", name),
                        "Another operation holds this plugin",
                    );
                }
            }
        } else {
            None
        };

        let request = InstallRequest {
            plugin,
            explicit_version: None,
            auto_dependencies: true,
        };
        let result = InstallTransaction::new(&self.ctx)
            .run(&request, self, chain)
            .await;
        if guard.is_some() {
            chain.release(&name);
        }
        result
    }
}

/// The record a local file install overwrites: the one registered under the
/// manifest name, else the one whose archive has the same file name.
fn replaced_record<'r>(
    registry: &'r Registry,
    name: &str,
    filename: &str,
) -> Option<&'r InstalledPluginRecord> {
    registry.get(name).or_else(|| {
        registry
            .records()
            .iter()
            .find(|r| r.filename.eq_ignore_ascii_case(filename))
    })
}

async fn copy_into(source: &Path, dest: &Path) -> PluginResult<()> {
    if let Some(parent) = dest.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PluginError::io(parent, e))?;
    }
    let same = match (
        tokio::fs::canonicalize(source).await,
        tokio::fs::canonicalize(dest).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    };
    if !same {
        tokio::fs::copy(source, dest)
            .await
            .map_err(|e| PluginError::io(dest, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testing::{
        descriptor, jar_bytes, plugin_yml_jar, version, write_file, FakeFetcher, FakeSource,
    };
    use tempfile::TempDir;

    fn server(tmp: &TempDir) -> ServerConfig {
        let mut server = ServerConfig::new("paper", "1.20.4", tmp.path().join("plugins"));
        server.registry_path = Some(tmp.path().join("installed_plugins.json"));
        server
    }

    async fn manager(tmp: &TempDir, sources: SourceSet, fetcher: Arc<FakeFetcher>) -> PluginManager {
        PluginManager::new(
            server(tmp),
            sources,
            fetcher,
            Arc::new(ResponseCache::disabled()),
        )
        .await
    }

    fn vault_source() -> FakeSource {
        FakeSource::new(SourceKind::Modrinth)
            .with_hit(descriptor(SourceKind::Modrinth, "vault"))
            .with_versions(
                "vault",
                vec![version("vault", "2.0"), version("vault", "1.0")],
            )
    }

    #[tokio::test]
    async fn second_install_is_a_no_op() {
        let tmp = TempDir::new().unwrap();
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/vault-2.0.jar", plugin_yml_jar("Vault", "2.0", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(vault_source()), fetcher.clone()).await;
        let target = descriptor(SourceKind::Modrinth, "vault");

        let first = pm.install(target.clone(), None, true, None).await;
        assert!(first.success, "{:?}", first);
        assert_eq!(first.detail_str("state"), Some("DONE"));
        assert!(tmp.path().join("plugins").join("vault-2.0.jar").exists());

        let second = pm.install(target, None, true, None).await;
        assert!(second.success);
        assert_eq!(second.detail("already_installed"), Some(&serde_json::json!(true)));
        assert_eq!(fetcher.fetch_count(), 1);
        assert_eq!(pm.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupt_download_leaves_nothing_behind() {
        let tmp = TempDir::new().unwrap();
        let fetcher = Arc::new(
            FakeFetcher::new().with_archive("https://fake.test/vault-2.0.jar", b"not a zip".to_vec()),
        );
        let pm = manager(&tmp, SourceSet::new().with(vault_source()), fetcher).await;

        let result = pm
            .install(descriptor(SourceKind::Modrinth, "vault"), None, false, None)
            .await;
        assert!(!result.success);
        assert_eq!(result.detail_str("state"), Some("FAILED"));
        assert!(!tmp.path().join("plugins").join("vault-2.0.jar").exists());
        assert!(pm.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_update_restores_previous_archive() {
        let tmp = TempDir::new().unwrap();
        let original = plugin_yml_jar("Vault", "1.0", &[]);
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/vault-1.0.jar", original.clone())
                .with_archive("https://fake.test/vault-2.0.jar", b"truncated".to_vec()),
        );
        let pm = manager(&tmp, SourceSet::new().with(vault_source()), fetcher).await;

        let installed = pm
            .install(descriptor(SourceKind::Modrinth, "vault"), Some("1.0"), false, None)
            .await;
        assert!(installed.success, "{:?}", installed);

        let updated = pm.update("vault").await;
        assert!(!updated.success);
        let archive = tmp.path().join("plugins").join("vault-1.0.jar");
        assert_eq!(std::fs::read(&archive).unwrap(), original);
        let records = pm.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].version, "1.0");
    }

    #[tokio::test]
    async fn update_replaces_in_place_and_reports_versions() {
        let tmp = TempDir::new().unwrap();
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/vault-1.0.jar", plugin_yml_jar("Vault", "1.0", &[]))
                .with_archive("https://fake.test/vault-2.0.jar", plugin_yml_jar("Vault", "2.0", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(vault_source()), fetcher).await;
        pm.install(descriptor(SourceKind::Modrinth, "vault"), Some("1.0"), false, None)
            .await;

        let updates = pm.check_updates().await;
        assert_eq!(updates.get("vault").map(String::as_str), Some("2.0"));

        let updated = pm.update("vault").await;
        assert!(updated.success, "{:?}", updated);
        assert_eq!(updated.detail_str("previous_version"), Some("1.0"));
        let records = pm.list().await.unwrap();
        assert_eq!(records[0].version, "2.0");
        assert_eq!(records[0].filename, "vault-1.0.jar");

        let again = pm.update("vault").await;
        assert!(again.success);
        assert!(again.message.contains("already up to date"));
        assert!(pm.check_updates().await.is_empty());
    }

    #[tokio::test]
    async fn dependency_is_committed_before_dependent() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeSource::new(SourceKind::Modrinth)
            .with_hit(descriptor(SourceKind::Modrinth, "dep"))
            .with_versions("root", vec![version("root", "1.0")])
            .with_versions("dep", vec![version("dep", "3.1")])
            .with_dependency("root", "dep");
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/root-1.0.jar", plugin_yml_jar("root", "1.0", &["dep"]))
                .with_archive("https://fake.test/dep-3.1.jar", plugin_yml_jar("dep", "3.1", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(fake), fetcher).await;

        let result = pm
            .install(descriptor(SourceKind::Modrinth, "root"), None, true, None)
            .await;
        assert!(result.success, "{:?}", result);
        assert_eq!(
            result.detail("dependencies_installed"),
            Some(&serde_json::json!(["dep"]))
        );
        let names: Vec<_> = pm.list().await.unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["dep", "root"]);
    }

    #[tokio::test]
    async fn name_lookup_honours_preferred_source() {
        let tmp = TempDir::new().unwrap();
        let modrinth = FakeSource::new(SourceKind::Modrinth)
            .with_hit(descriptor(SourceKind::Modrinth, "we"))
            .with_versions("we", vec![version("we", "7.3")]);
        let hangar = FakeSource::new(SourceKind::Hangar)
            .with_hit(descriptor(SourceKind::Hangar, "we"))
            .with_versions("we", vec![version("we", "7.3")]);
        let fetcher = Arc::new(
            FakeFetcher::new().with_archive("https://fake.test/we-7.3.jar", plugin_yml_jar("WorldEdit", "7.3", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(modrinth).with(hangar), fetcher).await;

        let result = pm.install("we", None, false, Some(SourceKind::Hangar)).await;
        assert!(result.success, "{:?}", result);
        assert_eq!(result.detail_str("source"), Some("hangar"));

        let empty = manager(&tmp, SourceSet::new(), Arc::new(FakeFetcher::new())).await;
        let missing = empty.install("nothing-here", None, false, Some(SourceKind::SpigotMc)).await;
        assert!(!missing.success);
        assert_eq!(missing.message, "Plugin not found: nothing-here");
    }

    #[tokio::test]
    async fn local_file_install_is_registered_as_manual() {
        let tmp = TempDir::new().unwrap();
        let pm = manager(&tmp, SourceSet::new(), Arc::new(FakeFetcher::new())).await;

        let txt = write_file(tmp.path(), "notes.txt", b"hello");
        assert!(!pm.install_from_file(&txt).await.success);

        let bad = write_file(tmp.path(), "bad.jar", &jar_bytes(&[("readme.txt", "x")]));
        assert!(!pm.install_from_file(&bad).await.success);

        let good = write_file(tmp.path(), "Shop.jar", &plugin_yml_jar("Shop", "4.2", &[]));
        let result = pm.install_from_file(&good).await;
        assert!(result.success, "{:?}", result);
        assert!(tmp.path().join("plugins").join("Shop.jar").exists());

        let records = pm.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_manual());
        assert_eq!(records[0].version, "4.2");

        let update = pm.update("Shop").await;
        assert!(!update.success);
        assert!(pm.check_updates().await.is_empty());
    }

    #[tokio::test]
    async fn uninstall_then_restore_backup() {
        let tmp = TempDir::new().unwrap();
        let pm = manager(&tmp, SourceSet::new(), Arc::new(FakeFetcher::new())).await;
        let jar = write_file(tmp.path(), "Shop.jar", &plugin_yml_jar("Shop", "4.2", &[]));
        assert!(pm.install_from_file(&jar).await.success);

        let removed = pm.uninstall("shop").await;
        assert!(removed.success, "{:?}", removed);
        assert!(removed.detail_str("backup").is_some());
        assert!(!tmp.path().join("plugins").join("Shop.jar").exists());
        assert!(pm.list().await.unwrap().is_empty());
        assert!(!pm.uninstall("shop").await.success);

        let restored = pm.restore_latest_backup("Shop").await;
        assert!(restored.success, "{:?}", restored);
        assert!(tmp.path().join("plugins").join("Shop.jar").exists());
    }

    #[tokio::test]
    async fn concurrent_installs_share_one_dependency_download() {
        let tmp = TempDir::new().unwrap();
        let fake = FakeSource::new(SourceKind::Modrinth)
            .with_hit(descriptor(SourceKind::Modrinth, "c"))
            .with_versions("a", vec![version("a", "1.0")])
            .with_versions("b", vec![version("b", "1.0")])
            .with_versions("c", vec![version("c", "1.0")])
            .with_dependency("a", "c")
            .with_dependency("b", "c");
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/a-1.0.jar", plugin_yml_jar("a", "1.0", &["c"]))
                .with_archive("https://fake.test/b-1.0.jar", plugin_yml_jar("b", "1.0", &["c"]))
                .with_archive("https://fake.test/c-1.0.jar", plugin_yml_jar("c", "1.0", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(fake), fetcher.clone()).await;

        let (a, b) = tokio::join!(
            pm.install(descriptor(SourceKind::Modrinth, "a"), None, true, None),
            pm.install(descriptor(SourceKind::Modrinth, "b"), None, true, None),
        );
        assert!(a.success, "{:?}", a);
        assert!(b.success, "{:?}", b);
        assert_eq!(fetcher.fetch_count_for("https://fake.test/c-1.0.jar"), 1);

        let records = pm.list().await.unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records.iter().filter(|r| r.name == "c").count(), 1);
    }

    #[tokio::test]
    async fn same_filename_from_two_plugins_keeps_both() {
        let tmp = TempDir::new().unwrap();
        let shared = |id: &str| PluginVersion {
            filename: Some("plugin.jar".to_string()),
            ..version(id, "1.0")
        };
        let fake = FakeSource::new(SourceKind::Modrinth)
            .with_versions("a", vec![shared("a")])
            .with_versions("b", vec![shared("b")]);
        let fetcher = Arc::new(
            FakeFetcher::new()
                .with_archive("https://fake.test/a-1.0.jar", plugin_yml_jar("a", "1.0", &[]))
                .with_archive("https://fake.test/b-1.0.jar", plugin_yml_jar("b", "1.0", &[])),
        );
        let pm = manager(&tmp, SourceSet::new().with(fake), fetcher).await;

        let a = pm.install(descriptor(SourceKind::Modrinth, "a"), None, false, None).await;
        let b = pm.install(descriptor(SourceKind::Modrinth, "b"), None, false, None).await;
        assert_eq!(a.detail_str("filename"), Some("plugin.jar"));
        assert_eq!(b.detail_str("filename"), Some("b-plugin.jar"));

        let plugins = tmp.path().join("plugins");
        assert_eq!(std::fs::read(plugins.join("plugin.jar")).unwrap(), plugin_yml_jar("a", "1.0", &[]));
        assert!(plugins.join("b-plugin.jar").exists());
        assert_eq!(pm.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn local_file_takes_over_the_record_it_overwrites() {
        let tmp = TempDir::new().unwrap();
        let pm = manager(&tmp, SourceSet::new(), Arc::new(FakeFetcher::new())).await;
        let plugins = tmp.path().join("plugins");

        let first = write_file(tmp.path(), "Shop.jar", &plugin_yml_jar("Shop", "4.2", &[]));
        assert!(pm.install_from_file(&first).await.success);

        let renamed = write_file(&tmp.path().join("incoming"), "Shop.jar", &plugin_yml_jar("ShopPlus", "5.0", &[]));
        let result = pm.install_from_file(&renamed).await;
        assert!(result.success, "{:?}", result);
        assert!(result.detail_str("backup").is_some());
        let records = pm.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "ShopPlus");

        let moved = write_file(tmp.path(), "ShopPlus-5.1.jar", &plugin_yml_jar("ShopPlus", "5.1", &[]));
        assert!(pm.install_from_file(&moved).await.success);
        assert!(!plugins.join("Shop.jar").exists());
        let records = pm.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].filename, "ShopPlus-5.1.jar");
    }

    #[tokio::test]
    async fn file_install_locks_under_the_registered_name() {
        let tmp = TempDir::new().unwrap();
        let pm = manager(&tmp, SourceSet::new(), Arc::new(FakeFetcher::new())).await;
        let jar = write_file(tmp.path(), "Shop.jar", &plugin_yml_jar("Shop", "4.2", &[]));
        assert!(pm.install_from_file(&jar).await.success);

        let registry = pm.ctx.registry.lock().await;
        assert_eq!(
            replaced_record(&registry, "ShopPlus", "shop.JAR").map(|r| r.name.as_str()),
            Some("Shop")
        );
        assert!(replaced_record(&registry, "Other", "Other.jar").is_none());
    }
}
