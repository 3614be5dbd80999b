use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::dependencies::{DependencyInstaller, DependencyReport, DependencyResolver, InstallChain};
use super::fetch::{file_sha1, ArchiveFetcher};
use super::outcome::OperationResult;
use crate::core::registry::{
    archive_filename, safe_name, BackupStore, InstalledPluginRecord, Registry,
};
use crate::core::sources::PluginDescriptor;
use crate::core::validator::{ValidationResult, Validator};
use crate::core::version::{ResolvedVersion, VersionResolver};

/// `NEW → RESOLVING_VERSION → DOWNLOADING → VALIDATING →
/// (COMMITTING | ROLLED_BACK) → DONE | FAILED`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    New,
    ResolvingVersion,
    Downloading,
    Validating,
    Committing,
    RolledBack,
    Done,
    Failed,
}

/// Everything a transaction touches, shared by every transaction of one
/// plugin manager.
pub struct InstallContext {
    pub versions: VersionResolver,
    pub dependencies: DependencyResolver,
    pub fetcher: Arc<dyn ArchiveFetcher>,
    pub registry: Mutex<Registry>,
    pub validator: Validator,
    pub backups: BackupStore,
    pub plugins_dir: PathBuf,
    pub game_version: String,
}

#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub plugin: PluginDescriptor,
    pub explicit_version: Option<String>,
    pub auto_dependencies: bool,
}

/// One install or update of one plugin.
///
/// Nothing beyond writing the downloaded archive to its final path happens
/// before validation passes. A failed attempt deletes what it wrote and
/// restores the archive it replaced.
pub struct InstallTransaction<'a> {
    ctx: &'a InstallContext,
    id: Uuid,
    trail: Vec<TransactionState>,
}

impl<'a> InstallTransaction<'a> {
    pub fn new(ctx: &'a InstallContext) -> Self {
        Self {
            ctx,
            id: Uuid::new_v4(),
            trail: vec![TransactionState::New],
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.trail
            .last()
            .copied()
            .unwrap_or(TransactionState::New)
    }

    /// Every state entered so far, in order.
    pub fn trail(&self) -> &[TransactionState] {
        &self.trail
    }

    fn advance(&mut self, next: TransactionState) {
        debug!("{:?} -> {:?}", self.state(), next);
        self.trail.push(next);
    }

    pub async fn run(
        &mut self,
        request: &InstallRequest,
        installer: &dyn DependencyInstaller,
        chain: &mut InstallChain,
    ) -> OperationResult {
        let span = info_span!(
            "install",
            txn = %self.id,
            plugin = %request.plugin.name,
            source = %request.plugin.source,
        );
        let result = self.execute(request, installer, chain).instrument(span).await;
        result
            .with_detail("transaction_id", self.id.to_string())
            .with_detail("state", self.state())
    }

    async fn execute(
        &mut self,
        request: &InstallRequest,
        installer: &dyn DependencyInstaller,
        chain: &mut InstallChain,
    ) -> OperationResult {
        let plugin = &request.plugin;
        let game_version = self.ctx.game_version.clone();

        // ── Resolve ──
        self.advance(TransactionState::ResolvingVersion);
        let resolved = self
            .ctx
            .versions
            .resolve(plugin, Some(&game_version), request.explicit_version.as_deref())
            .await;
        let Some(url) = resolved.download_url.clone() else {
            self.advance(TransactionState::Failed);
            return OperationResult::fail(
                format!("Could not resolve download URL for {}", plugin.name),
                "Version not found or API error",
            );
        };

        let existing = self.existing_record(&plugin.name).await;
        if let Some(record) = &existing {
            if is_same_version(record, &resolved) {
                info!("{} v{} is already installed", plugin.name, record.version);
                self.advance(TransactionState::Done);
                return OperationResult::ok(format!(
                    "{} v{} is already installed",
                    plugin.name, record.version
                ))
                .with_detail("already_installed", true)
                .with_detail("name", &record.name)
                .with_detail("version", &record.version)
                .with_detail("filename", &record.filename);
            }
        }

        // ── Dependencies (fail-open) ──
        let dependencies = if request.auto_dependencies {
            self.ctx
                .dependencies
                .resolve_and_install(plugin, Some(&game_version), installer, chain)
                .await
        } else {
            DependencyReport::default()
        };
        let mut warnings: Vec<String> = Vec::new();
        if !dependencies.is_complete() {
            warn!(
                "Some dependencies failed for {}: {}",
                plugin.name,
                dependencies.failed.join(", ")
            );
            warnings.push(format!(
                "Some dependencies failed: {}",
                dependencies.failed.join(", ")
            ));
        }

        // ── Download ──
        self.advance(TransactionState::Downloading);
        let filename = match &existing {
            Some(record) => record.filename.clone(),
            None => {
                let candidate = pick_filename(plugin, &resolved, &url);
                self.unclaimed_filename(plugin, candidate).await
            }
        };
        let dest = self.ctx.plugins_dir.join(&filename);

        let backup = match self.back_up_current(&dest, plugin, existing.as_ref()).await {
            Ok(backup) => backup,
            Err(message) => {
                self.advance(TransactionState::Failed);
                return OperationResult::fail(
                    format!("Could not back up current {}", plugin.name),
                    message,
                );
            }
        };

        let sha1 = resolved.entry.as_ref().and_then(|v| v.sha1.as_deref());
        let written = match self.ctx.fetcher.fetch(&url, &dest, sha1).await {
            Ok(written) => written,
            Err(e) => {
                error!("Download failed for {}: {}", plugin.name, e);
                let result = OperationResult::fail(
                    format!("Download failed for {}", plugin.name),
                    e.to_string(),
                )
                .with_detail("url", &url);
                return self.roll_back(&dest, backup.as_deref(), result).await;
            }
        };

        // ── Validate ──
        self.advance(TransactionState::Validating);
        let validation = self.validate(&dest, chain.installed_names()).await;
        if !validation.is_valid {
            let errors = validation.error_summary();
            warn!("Validation failed for {}: {}", plugin.name, errors);
            let result = OperationResult::fail(
                format!("Validation failed for {}: {}", plugin.name, errors),
                errors,
            )
            .with_detail("issues", &validation.issues);
            return self.roll_back(&dest, backup.as_deref(), result).await;
        }
        warnings.extend(validation.warning_messages());

        // ── Commit ──
        self.advance(TransactionState::Committing);
        let meta = validation.metadata;
        let version = meta
            .as_ref()
            .and_then(|m| m.version.clone())
            .unwrap_or_else(|| resolved.version.clone());

        let previous = existing.as_ref();
        let description = first_non_empty([
            plugin.description.as_str(),
            previous.map(|r| r.description.as_str()).unwrap_or_default(),
            meta.as_ref().map(|m| m.description.as_str()).unwrap_or_default(),
        ]);
        let manifest_authors = meta.as_ref().map(|m| m.authors.join(", ")).unwrap_or_default();
        let author = first_non_empty([
            plugin.author.as_str(),
            previous.map(|r| r.author.as_str()).unwrap_or_default(),
            manifest_authors.as_str(),
        ]);

        let record = InstalledPluginRecord {
            name: plugin.name.clone(),
            version: version.clone(),
            source: plugin.source.to_string(),
            source_id: plugin.id.clone(),
            filename: filename.clone(),
            installed_at: Utc::now().to_rfc3339(),
            mc_version: game_version,
            auto_update: previous.map(|r| r.auto_update).unwrap_or(false),
            dependencies: meta.as_ref().map(|m| m.depend.clone()).unwrap_or_default(),
            file_size: written,
            description,
            author,
            sha1: file_sha1(&dest).await.ok(),
        };

        {
            let mut registry = self.ctx.registry.lock().await;
            registry.upsert(record);
            if let Err(e) = registry.save().await {
                error!("Could not persist registry: {}", e);
                match &existing {
                    Some(old) => registry.upsert(old.clone()),
                    None => {
                        registry.remove(&plugin.name);
                    }
                }
                drop(registry);
                let result = OperationResult::fail(
                    format!("Could not register {}", plugin.name),
                    e.to_string(),
                );
                return self.roll_back(&dest, backup.as_deref(), result).await;
            }
        }

        chain.record_installed(plugin.name.clone());
        if let Some(meta) = &meta {
            if meta.name != plugin.name {
                chain.record_installed(meta.name.clone());
            }
        }

        self.advance(TransactionState::Done);
        info!(
            "Installed plugin: {} v{} ({}, {} bytes)",
            plugin.name, version, filename, written
        );
        OperationResult::ok(format!("Successfully installed {} v{}", plugin.name, version))
            .with_detail("name", &plugin.name)
            .with_detail("version", &version)
            .with_detail("filename", &filename)
            .with_detail("source", plugin.source)
            .with_detail("file_size", written)
            .with_detail("dependencies_installed", &dependencies.installed)
            .with_detail("dependencies_failed", &dependencies.failed)
            .with_detail("warnings", &warnings)
            .with_detail("backup", backup)
    }

    async fn existing_record(&self, name: &str) -> Option<InstalledPluginRecord> {
        let mut registry = self.ctx.registry.lock().await;
        if let Err(e) = registry.reconcile().await {
            warn!("Registry reconciliation failed: {}", e);
        }
        registry.get(name).cloned()
    }

    /// `candidate`, or the plugin-name-prefixed form when another plugin's
    /// record already owns that file.
    async fn unclaimed_filename(&self, plugin: &PluginDescriptor, candidate: String) -> String {
        let registry = self.ctx.registry.lock().await;
        let owner = registry
            .records()
            .iter()
            .find(|r| !r.matches_name(&plugin.name) && r.filename.eq_ignore_ascii_case(&candidate));
        match owner {
            Some(owner) => {
                let renamed = format!("{}-{}", safe_name(&plugin.name), candidate);
                warn!(
                    "{} already belongs to {}, saving {} as {}",
                    candidate, owner.name, plugin.name, renamed
                );
                renamed
            }
            None => candidate,
        }
    }

    /// Copy whatever currently sits at `dest` so it can be put back.
    async fn back_up_current(
        &self,
        dest: &Path,
        plugin: &PluginDescriptor,
        existing: Option<&InstalledPluginRecord>,
    ) -> Result<Option<PathBuf>, String> {
        let (name, version) = match existing {
            Some(record) => (record.name.as_str(), record.version.as_str()),
            None => (plugin.name.as_str(), "unregistered"),
        };
        self.ctx
            .backups
            .backup(dest, name, version)
            .await
            .map_err(|e| e.to_string())
    }

    async fn validate(&self, archive: &Path, also_present: &[String]) -> ValidationResult {
        let validator = self.ctx.validator.clone();
        let archive = archive.to_path_buf();
        let also_present = also_present.to_vec();
        let fallback_name = archive
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();

        match tokio::task::spawn_blocking(move || validator.validate_with(&archive, &also_present))
            .await
        {
            Ok(result) => result,
            Err(e) => {
                let mut result = ValidationResult::new(fallback_name);
                result.add_error(format!("Validation task failed: {}", e), "");
                result
            }
        }
    }

    /// Delete the written archive and put the previous one back.
    async fn roll_back(
        &mut self,
        dest: &Path,
        backup: Option<&Path>,
        mut result: OperationResult,
    ) -> OperationResult {
        if let Err(e) = tokio::fs::remove_file(dest).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                error!("Could not remove {:?}: {}", dest, e);
            }
        }
        if let Some(backup) = backup {
            match self.ctx.backups.restore(backup, dest).await {
                Ok(()) => result = result.with_detail("restored_from", backup),
                Err(e) => error!("Could not restore {:?} from {:?}: {}", dest, backup, e),
            }
        }
        self.advance(TransactionState::RolledBack);
        self.advance(TransactionState::Failed);
        result
    }
}

fn is_same_version(record: &InstalledPluginRecord, resolved: &ResolvedVersion) -> bool {
    if record.version == resolved.version {
        return true;
    }
    match (&record.sha1, resolved.entry.as_ref().and_then(|v| v.sha1.as_ref())) {
        (Some(installed), Some(offered)) => installed.eq_ignore_ascii_case(offered),
        _ => false,
    }
}

/// The registry's own filename when it names a jar, else derived from the
/// download URL.
fn pick_filename(plugin: &PluginDescriptor, resolved: &ResolvedVersion, url: &str) -> String {
    let listed = resolved
        .entry
        .as_ref()
        .and_then(|v| v.filename.as_deref())
        .filter(|f| f.ends_with(".jar"));
    match listed {
        Some(name) => archive_filename(&plugin.name, &format!("/{}", name)),
        None => archive_filename(&plugin.name, url),
    }
}

fn first_non_empty<const N: usize>(candidates: [&str; N]) -> String {
    candidates
        .into_iter()
        .find(|s| !s.is_empty())
        .unwrap_or_default()
        .to_string()
}
