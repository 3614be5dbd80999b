use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::Local;
use tracing::{info, warn};

use crate::core::error::{PluginError, PluginResult};

/// Replace anything outside `[A-Za-z0-9-_.]` with `-`.
pub fn safe_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Archive name for a download: the URL's last segment when it already
/// names a `.jar`, else the sanitized plugin name.
pub fn archive_filename(plugin_name: &str, url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some((_, last)) = path.rsplit_once('/') {
        if last.ends_with(".jar") {
            return safe_name(last);
        }
    }
    format!("{}.jar", safe_name(plugin_name))
}

/// Directory of timestamped archive copies taken before an archive is
/// replaced or removed.
#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `archive` to `<name>_<version>_<YYYYmmdd_HHMMSS>.jar`.
    /// `None` when there is nothing to back up.
    pub async fn backup(
        &self,
        archive: &Path,
        name: &str,
        version: &str,
    ) -> PluginResult<Option<PathBuf>> {
        if !tokio::fs::try_exists(archive).await.unwrap_or(false) {
            return Ok(None);
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| PluginError::io(&self.dir, e))?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup_name = format!("{}_{}_{}.jar", safe_name(name), safe_name(version), timestamp);
        let backup_path = self.dir.join(backup_name);

        tokio::fs::copy(archive, &backup_path)
            .await
            .map_err(|e| PluginError::io(&backup_path, e))?;
        info!("Backed up {:?} -> {:?}", archive, backup_path);
        Ok(Some(backup_path))
    }

    /// Copy a backup back over `dest`.
    pub async fn restore(&self, backup: &Path, dest: &Path) -> PluginResult<()> {
        tokio::fs::copy(backup, dest)
            .await
            .map_err(|e| PluginError::io(dest, e))?;
        info!("Restored {:?} from {:?}", dest, backup);
        Ok(())
    }

    /// Most recently modified backup whose name starts with the plugin's
    /// sanitized name.
    pub async fn latest_for(&self, name: &str) -> PluginResult<Option<PathBuf>> {
        let prefix = format!("{}_", safe_name(name));
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PluginError::io(&self.dir, e)),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PluginError::io(&self.dir, e))?
        {
            let file_name = entry.file_name().to_string_lossy().to_string();
            if !file_name.starts_with(&prefix) || !file_name.ends_with(".jar") {
                continue;
            }
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            let candidate = (modified, entry.path());
            if newest.as_ref().map_or(true, |current| candidate > *current) {
                newest = Some(candidate);
            }
        }
        Ok(newest.map(|(_, path)| path))
    }

    /// Restore the newest backup of `name` to `dest`. `None` when no backup
    /// exists.
    pub async fn restore_latest(&self, name: &str, dest: &Path) -> PluginResult<Option<PathBuf>> {
        let Some(backup) = self.latest_for(name).await? else {
            warn!("No backups found for {}", name);
            return Ok(None);
        };
        self.restore(&backup, dest).await?;
        Ok(Some(backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn filename_prefers_jar_segment_of_url() {
        assert_eq!(
            archive_filename("EssentialsX", "https://cdn.test/data/EssentialsX-2.20.1.jar"),
            "EssentialsX-2.20.1.jar"
        );
        assert_eq!(
            archive_filename("World Edit", "https://api.test/resources/13932/download"),
            "World-Edit.jar"
        );
        assert_eq!(
            archive_filename("X", "https://cdn.test/x%20y.jar?token=1"),
            "x-20y.jar"
        );
    }

    #[tokio::test]
    async fn backup_then_restore_latest() {
        let tmp = TempDir::new().unwrap();
        let store = BackupStore::new(tmp.path().join("backups"));
        let archive = tmp.path().join("Vault.jar");

        assert!(store.backup(&archive, "Vault", "1.0").await.unwrap().is_none());

        tokio::fs::write(&archive, b"v1").await.unwrap();
        let first = store.backup(&archive, "Vault", "1.0").await.unwrap().unwrap();
        let first_name = first.file_name().unwrap().to_string_lossy().to_string();
        assert!(first_name.starts_with("Vault_1.0_"));

        tokio::fs::write(&archive, b"v2").await.unwrap();
        store.backup(&archive, "Vault", "2.0").await.unwrap().unwrap();

        tokio::fs::write(&archive, b"broken").await.unwrap();
        let restored = store.restore_latest("Vault", &archive).await.unwrap();
        assert!(restored.is_some());
        assert_eq!(tokio::fs::read(&archive).await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn restore_latest_without_backups_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = BackupStore::new(tmp.path().join("missing"));
        let dest = tmp.path().join("x.jar");
        assert!(store.restore_latest("x", &dest).await.unwrap().is_none());
    }
}
