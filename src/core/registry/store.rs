use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::backup::BackupStore;
use super::model::{InstalledPluginRecord, RegistryFile};
use crate::core::error::{PluginError, PluginResult};

/// Durable table of installed plugins, kept as one JSON file.
///
/// Reads reconcile against the plugin directory: records whose archive has
/// disappeared are dropped and the pruned table is written back at once.
/// Every mutation rewrites the whole file.
pub struct Registry {
    path: PathBuf,
    plugins_dir: PathBuf,
    server_type: String,
    mc_version: String,
    records: Vec<InstalledPluginRecord>,
}

impl Registry {
    /// Load the registry at `path`. A missing or unreadable file yields an
    /// empty table.
    pub async fn load(
        path: impl Into<PathBuf>,
        plugins_dir: impl Into<PathBuf>,
        server_type: impl Into<String>,
        mc_version: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => match serde_json::from_str::<RegistryFile>(&raw) {
                Ok(file) => file.plugins,
                Err(e) => {
                    warn!("Could not parse plugin registry {:?}: {}", path, e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!("Could not read plugin registry {:?}: {}", path, e);
                Vec::new()
            }
        };
        debug!("Loaded {} plugins from registry", records.len());

        Self {
            path,
            plugins_dir: plugins_dir.into(),
            server_type: server_type.into(),
            mc_version: mc_version.into(),
            records,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn archive_path(&self, record: &InstalledPluginRecord) -> PathBuf {
        self.plugins_dir.join(&record.filename)
    }

    /// Drop records whose archive is gone, persisting when anything was
    /// removed. Returns the number of pruned records.
    pub async fn reconcile(&mut self) -> PluginResult<usize> {
        let before = self.records.len();
        let mut kept = Vec::with_capacity(before);
        for record in std::mem::take(&mut self.records) {
            let archive = self.archive_path(&record);
            if tokio::fs::try_exists(&archive).await.unwrap_or(false) {
                kept.push(record);
            } else {
                info!("Pruning {} from registry: {:?} no longer exists", record.name, archive);
            }
        }
        let pruned = before - kept.len();
        self.records = kept;
        if pruned > 0 {
            self.save().await?;
        }
        Ok(pruned)
    }

    /// Reconciled records.
    pub async fn list(&mut self) -> PluginResult<Vec<InstalledPluginRecord>> {
        self.reconcile().await?;
        Ok(self.records.clone())
    }

    /// Records as last loaded or written, without touching the disk.
    pub fn records(&self) -> &[InstalledPluginRecord] {
        &self.records
    }

    pub fn get(&self, name: &str) -> Option<&InstalledPluginRecord> {
        self.records.iter().find(|r| r.matches_name(name))
    }

    pub fn contains_source_id(&self, source: &str, source_id: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.source == source && r.source_id == source_id)
    }

    /// Insert or replace the single record for this name.
    pub fn upsert(&mut self, record: InstalledPluginRecord) {
        self.records.retain(|r| !r.matches_name(&record.name));
        self.records.push(record);
    }

    pub fn remove(&mut self, name: &str) -> Option<InstalledPluginRecord> {
        let index = self.records.iter().position(|r| r.matches_name(name))?;
        Some(self.records.remove(index))
    }

    pub async fn save(&self) -> PluginResult<()> {
        let file = RegistryFile {
            plugins: self.records.clone(),
            server_type: self.server_type.clone(),
            mc_version: self.mc_version.clone(),
            plugin_count: self.records.len(),
            last_updated: Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&file)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| PluginError::io(&self.path, e))?;
        debug!("Saved registry with {} plugins", self.records.len());
        Ok(())
    }

    /// Back up and delete the plugin's archive, then drop its record.
    /// Returns the backup path when an archive existed.
    pub async fn uninstall(
        &mut self,
        name: &str,
        backups: &BackupStore,
    ) -> PluginResult<Option<PathBuf>> {
        let record = self
            .get(name)
            .cloned()
            .ok_or_else(|| PluginError::NotInstalled(name.to_string()))?;

        let archive = self.archive_path(&record);
        let backup = backups.backup(&archive, &record.name, &record.version).await?;
        if backup.is_some() {
            tokio::fs::remove_file(&archive)
                .await
                .map_err(|e| PluginError::io(&archive, e))?;
            info!("Deleted plugin archive {:?}", archive);
        }

        let data_dir = self.plugins_dir.join(&record.name);
        if data_dir.is_dir() {
            info!("Plugin data directory {:?} left in place", data_dir);
        }

        self.remove(&record.name);
        self.save().await?;
        info!("Uninstalled plugin {}", record.name);
        Ok(backup)
    }
}
