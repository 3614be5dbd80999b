use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::model::ValidationResult;
use crate::core::manifest::{extract_metadata, PluginMetadata};
use crate::core::platform::Platform;
use crate::core::version::major_minor;

/// Checks plugin archives against the server they are meant for.
///
/// Runs, in order: integrity, platform compatibility, game version,
/// duplicates, dependency presence. An integrity failure stops the run.
#[derive(Debug, Clone)]
pub struct Validator {
    platform_id: String,
    platform: Option<Platform>,
    game_version: String,
    plugins_dir: PathBuf,
}

impl Validator {
    pub fn new(
        platform_id: impl Into<String>,
        game_version: impl Into<String>,
        plugins_dir: impl Into<PathBuf>,
    ) -> Self {
        let platform_id = platform_id.into().trim().to_lowercase();
        let platform = platform_id.parse().ok();
        Self {
            platform_id,
            platform,
            game_version: game_version.into(),
            plugins_dir: plugins_dir.into(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    pub fn validate(&self, archive: &Path) -> ValidationResult {
        self.validate_with(archive, &[])
    }

    /// `also_present` names plugins installed earlier in the same
    /// transaction that should satisfy dependency checks.
    pub fn validate_with(&self, archive: &Path, also_present: &[String]) -> ValidationResult {
        let fallback_name = archive
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let mut result = ValidationResult::new(fallback_name);

        if !check_integrity(archive, &mut result) {
            return result;
        }

        let Some(meta) = extract_metadata(archive) else {
            result.add_error("Could not extract plugin metadata from archive", "");
            return result;
        };
        result.plugin_name = meta.name.clone();

        self.check_platform(&meta, &mut result);
        self.check_game_version(&meta, &mut result);

        let neighbours = self.scan_directory(archive);
        check_duplicates(&meta, &neighbours, &mut result);
        check_dependencies(&meta, &neighbours, also_present, &mut result);

        debug!(
            "Validated {:?}: valid={} issues={}",
            archive,
            result.is_valid,
            result.issues.len()
        );
        result.metadata = Some(meta);
        result
    }

    /// Validate every `*.jar` in the plugin directory.
    pub fn validate_all(&self) -> Vec<ValidationResult> {
        list_archives(&self.plugins_dir)
            .iter()
            .map(|path| self.validate(path))
            .collect()
    }

    fn check_platform(&self, meta: &PluginMetadata, result: &mut ValidationResult) {
        let Some(platform) = self.platform else {
            result.add_info(
                format!(
                    "Unknown server platform '{}', compatibility not checked",
                    self.platform_id
                ),
                "plugin_type",
            );
            return;
        };

        let allowed = platform.allowed_plugin_types();
        if !allowed.contains(&meta.plugin_type) {
            let expected = if allowed.is_empty() {
                "none".to_string()
            } else {
                allowed
                    .iter()
                    .map(|t| t.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            result.add_error(
                format!(
                    "Plugin type '{}' is not compatible with '{}' server (expected: {})",
                    meta.plugin_type, platform, expected
                ),
                "plugin_type",
            );
        }
    }

    fn check_game_version(&self, meta: &PluginMetadata, result: &mut ValidationResult) {
        let Some(api_version) = meta.api_version.as_deref() else {
            return;
        };
        match (major_minor(api_version), major_minor(&self.game_version)) {
            (Some(api), Some(server)) if api > server => result.add_warning(
                format!(
                    "Plugin targets API version {}, but server is running {}",
                    api_version, self.game_version
                ),
                "api_version",
            ),
            (Some(_), Some(_)) => {}
            _ => result.add_info(
                format!("Could not parse API version: {}", api_version),
                "api_version",
            ),
        }
    }

    /// Metadata of every other archive in the plugin directory.
    fn scan_directory(&self, exclude: &Path) -> Vec<(PathBuf, PluginMetadata)> {
        let excluded = canonical(exclude);
        list_archives(&self.plugins_dir)
            .into_iter()
            .filter(|path| canonical(path) != excluded)
            .filter_map(|path| extract_metadata(&path).map(|meta| (path, meta)))
            .collect()
    }
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// `*.jar` files directly inside `dir`, sorted by name. Empty when the
/// directory does not exist.
pub fn list_archives(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };
    let mut archives: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("jar"))
                    .unwrap_or(false)
        })
        .collect();
    archives.sort();
    archives
}

/// Exists, is non-empty, opens as a zip, and every member decompresses
/// with a matching checksum.
fn check_integrity(archive: &Path, result: &mut ValidationResult) -> bool {
    let size = match std::fs::metadata(archive) {
        Ok(meta) => meta.len(),
        Err(_) => {
            result.add_error(format!("File not found: {}", archive.display()), "");
            return false;
        }
    };
    if size == 0 {
        result.add_error("Archive is empty (0 bytes)", "");
        return false;
    }

    let file = match std::fs::File::open(archive) {
        Ok(file) => file,
        Err(e) => {
            result.add_error(format!("Cannot open archive: {}", e), "");
            return false;
        }
    };
    let mut zip = match zip::ZipArchive::new(file) {
        Ok(zip) => zip,
        Err(e) => {
            result.add_error(format!("File is not a valid JAR/ZIP archive: {}", e), "");
            return false;
        }
    };

    for i in 0..zip.len() {
        let mut entry = match zip.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                result.add_error(format!("Corrupted entry #{} inside archive: {}", i, e), "");
                return false;
            }
        };
        if let Err(e) = std::io::copy(&mut entry, &mut std::io::sink()) {
            let name = entry.name().to_string();
            warn!("Corrupt member {} in {:?}: {}", name, archive, e);
            result.add_error(format!("Corrupted file inside archive: {}", name), "");
            return false;
        }
    }
    true
}

fn check_duplicates(
    meta: &PluginMetadata,
    neighbours: &[(PathBuf, PluginMetadata)],
    result: &mut ValidationResult,
) {
    for (path, other) in neighbours {
        if other.name == meta.name {
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            result.add_warning(
                format!(
                    "Duplicate plugin detected: '{}' also exists as {}",
                    meta.name, file_name
                ),
                "duplicate",
            );
        }
    }
}

fn check_dependencies(
    meta: &PluginMetadata,
    neighbours: &[(PathBuf, PluginMetadata)],
    also_present: &[String],
    result: &mut ValidationResult,
) {
    if meta.depend.is_empty() {
        return;
    }
    let present: HashSet<&str> = neighbours
        .iter()
        .map(|(_, m)| m.name.as_str())
        .chain(also_present.iter().map(String::as_str))
        .collect();

    for dep in &meta.depend {
        if !present.contains(dep.as_str()) {
            result.add_warning(
                format!("Required dependency '{}' not found in plugins directory", dep),
                "depend",
            );
        }
    }
}
