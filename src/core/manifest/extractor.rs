use std::collections::BTreeMap;
use std::io::{Read, Seek};
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use super::fallback::{parse_flat_yaml, FieldValue, ManifestFields};
use super::model::PluginMetadata;
use crate::core::platform::PluginType;

pub const BUKKIT_MANIFEST: &str = "plugin.yml";
pub const BUNGEE_MANIFEST: &str = "bungee.yml";
pub const VELOCITY_MANIFEST: &str = "velocity-plugin.json";
pub const FABRIC_MANIFEST: &str = "fabric.mod.json";
/// Matched as a suffix so both `META-INF/mods.toml` and
/// `META-INF/neoforge.mods.toml` are recognized.
pub const FORGE_MANIFEST_SUFFIX: &str = "mods.toml";

/// Known manifest entries in the order they are looked for.
pub const MANIFEST_ENTRIES: [&str; 5] = [
    BUKKIT_MANIFEST,
    BUNGEE_MANIFEST,
    VELOCITY_MANIFEST,
    FABRIC_MANIFEST,
    FORGE_MANIFEST_SUFFIX,
];

/// Dependency ids in `fabric.mod.json` that name the platform itself.
const FABRIC_PLATFORM_IDS: [&str; 4] = ["minecraft", "java", "fabricloader", "fabric"];

/// Read the canonical metadata out of a plugin archive.
///
/// Returns `None` when the file cannot be opened as a zip, carries none of
/// the known manifests, or its manifest cannot be read. The first manifest
/// found in [`MANIFEST_ENTRIES`] order wins.
pub fn extract_metadata(path: &Path) -> Option<PluginMetadata> {
    let file = match std::fs::File::open(path) {
        Ok(file) => file,
        Err(e) => {
            debug!("Cannot open {:?}: {}", path, e);
            return None;
        }
    };
    let mut archive = match zip::ZipArchive::new(file) {
        Ok(archive) => archive,
        Err(e) => {
            debug!("{:?} is not a readable archive: {}", path, e);
            return None;
        }
    };
    extract_from_archive(&mut archive)
}

pub fn extract_from_archive<R: Read + Seek>(
    archive: &mut zip::ZipArchive<R>,
) -> Option<PluginMetadata> {
    if let Some(text) = read_entry(archive, BUKKIT_MANIFEST) {
        return Some(parse_bukkit_manifest(&text, PluginType::Bukkit));
    }
    if let Some(text) = read_entry(archive, BUNGEE_MANIFEST) {
        return Some(parse_bukkit_manifest(&text, PluginType::BungeeCord));
    }
    if let Some(text) = read_entry(archive, VELOCITY_MANIFEST) {
        return parse_velocity_manifest(&text);
    }
    if let Some(text) = read_entry(archive, FABRIC_MANIFEST) {
        return parse_fabric_manifest(&text);
    }

    let forge_entry = archive
        .file_names()
        .find(|name| name.ends_with(FORGE_MANIFEST_SUFFIX))
        .map(str::to_string)?;
    let text = read_entry(archive, &forge_entry).unwrap_or_default();
    Some(parse_mods_toml(&text))
}

fn read_entry<R: Read + Seek>(archive: &mut zip::ZipArchive<R>, name: &str) -> Option<String> {
    let mut entry = archive.by_name(name).ok()?;
    let mut bytes = Vec::new();
    if let Err(e) = entry.read_to_end(&mut bytes) {
        warn!("Failed to read {} from archive: {}", name, e);
        return None;
    }
    Some(String::from_utf8_lossy(&bytes).into_owned())
}

// ─── Bukkit / BungeeCord ───

/// Structured YAML first; flat line reader when the document does not
/// parse as a mapping.
fn bukkit_fields(content: &str) -> ManifestFields {
    let mapping = match serde_yaml::from_str::<serde_yaml::Value>(content) {
        Ok(serde_yaml::Value::Mapping(mapping)) => mapping,
        Ok(_) => return parse_flat_yaml(content),
        Err(e) => {
            debug!("Manifest is not strict YAML ({}), using line reader", e);
            return parse_flat_yaml(content);
        }
    };

    // YAML reads `api-version: 1.20` as the float 1.2; the line reader
    // keeps the text as written.
    let raw = parse_flat_yaml(content);
    let mut fields = ManifestFields::new();
    for (key, value) in mapping {
        let Some(key) = yaml_scalar(&key).map(|k| k.to_lowercase()) else {
            continue;
        };
        let field = match value {
            serde_yaml::Value::Number(n) => match raw.get(&key) {
                Some(FieldValue::Scalar(text)) => FieldValue::Scalar(text.clone()),
                _ => FieldValue::Scalar(n.to_string()),
            },
            serde_yaml::Value::Sequence(items) => {
                FieldValue::List(items.iter().filter_map(yaml_scalar).collect())
            }
            other => match yaml_scalar(&other) {
                Some(s) => FieldValue::Scalar(s),
                None => continue,
            },
        };
        fields.insert(key, field);
    }
    fields
}

fn yaml_scalar(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn parse_bukkit_manifest(content: &str, plugin_type: PluginType) -> PluginMetadata {
    let mut fields = bukkit_fields(content);
    let mut take_scalar = |key: &str| fields.remove(key).and_then(FieldValue::into_scalar);

    let name = take_scalar("name");
    let version = take_scalar("version");
    let main_class = take_scalar("main");
    let api_version = take_scalar("api-version");
    let description = take_scalar("description");

    let mut take_list = |key: &str| {
        fields
            .remove(key)
            .map(FieldValue::into_list)
            .unwrap_or_default()
    };
    let mut authors = take_list("authors");
    if authors.is_empty() {
        authors = take_list("author");
    }

    PluginMetadata {
        name: name.unwrap_or_else(|| PluginMetadata::UNKNOWN_NAME.to_string()),
        version,
        main_class,
        api_version,
        description: description.unwrap_or_default(),
        authors,
        depend: take_list("depend"),
        soft_depend: take_list("softdepend"),
        load_before: take_list("loadbefore"),
        plugin_type,
    }
}

// ─── Velocity ───

#[derive(Debug, Deserialize)]
struct VelocityManifest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    main: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    dependencies: Vec<VelocityDependency>,
}

#[derive(Debug, Deserialize)]
struct VelocityDependency {
    id: String,
    #[serde(default)]
    optional: bool,
}

fn parse_velocity_manifest(content: &str) -> Option<PluginMetadata> {
    let manifest: VelocityManifest = match serde_json::from_str(content) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Malformed {}: {}", VELOCITY_MANIFEST, e);
            return None;
        }
    };

    let (soft, hard): (Vec<_>, Vec<_>) =
        manifest.dependencies.into_iter().partition(|d| d.optional);

    let mut meta = PluginMetadata::unnamed(PluginType::Velocity);
    if let Some(id) = manifest.id {
        meta.name = id;
    }
    meta.version = manifest.version;
    meta.main_class = manifest.main;
    meta.description = manifest.description.unwrap_or_default();
    meta.authors = manifest.authors;
    meta.depend = hard.into_iter().map(|d| d.id).collect();
    meta.soft_depend = soft.into_iter().map(|d| d.id).collect();
    Some(meta)
}

// ─── Fabric ───

#[derive(Debug, Deserialize)]
struct FabricManifest {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    authors: Vec<FabricPerson>,
    #[serde(default)]
    entrypoints: FabricEntrypoints,
    #[serde(default)]
    depends: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    recommends: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FabricPerson {
    Name(String),
    Detailed { name: String },
}

#[derive(Debug, Default, Deserialize)]
struct FabricEntrypoints {
    #[serde(default)]
    main: Vec<FabricEntrypoint>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FabricEntrypoint {
    Class(String),
    Detailed { value: String },
}

fn fabric_mod_ids(map: BTreeMap<String, serde_json::Value>) -> Vec<String> {
    map.into_keys()
        .filter(|id| !FABRIC_PLATFORM_IDS.contains(&id.as_str()))
        .collect()
}

fn parse_fabric_manifest(content: &str) -> Option<PluginMetadata> {
    let manifest: FabricManifest = match serde_json::from_str(content) {
        Ok(manifest) => manifest,
        Err(e) => {
            warn!("Malformed {}: {}", FABRIC_MANIFEST, e);
            return None;
        }
    };

    let mut meta = PluginMetadata::unnamed(PluginType::Fabric);
    if let Some(name) = manifest.name.or(manifest.id) {
        meta.name = name;
    }
    meta.version = manifest.version;
    meta.main_class = manifest
        .entrypoints
        .main
        .into_iter()
        .next()
        .map(|e| match e {
            FabricEntrypoint::Class(class) => class,
            FabricEntrypoint::Detailed { value } => value,
        });
    meta.description = manifest.description.unwrap_or_default();
    meta.authors = manifest
        .authors
        .into_iter()
        .map(|a| match a {
            FabricPerson::Name(name) | FabricPerson::Detailed { name } => name,
        })
        .collect();
    meta.depend = fabric_mod_ids(manifest.depends);
    meta.soft_depend = fabric_mod_ids(manifest.recommends);
    Some(meta)
}

// ─── Forge ───

const FORGE_JAR_VERSION_PLACEHOLDER: &str = "${file.jarVersion}";

/// `key = "value"` on one line; multi-line strings are skipped.
fn toml_assignment(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once('=')?;
    let value = value.trim();
    if value.starts_with("'''") || value.starts_with("\"\"\"") {
        return None;
    }
    let value = value
        .strip_prefix('"')
        .and_then(|v| v.split_once('"'))
        .map(|(inner, _)| inner)
        .or_else(|| {
            value
                .strip_prefix('\'')
                .and_then(|v| v.split_once('\''))
                .map(|(inner, _)| inner)
        })?;
    Some((key.trim(), value))
}

fn parse_mods_toml(content: &str) -> PluginMetadata {
    let mut display_name = None;
    let mut mod_id = None;
    let mut version = None;
    let mut description = None;

    for line in content.lines() {
        let Some((key, value)) = toml_assignment(line.trim()) else {
            continue;
        };
        let slot = match key {
            "displayName" => &mut display_name,
            "modId" => &mut mod_id,
            "version" => &mut version,
            "description" => &mut description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }

    let mut meta = PluginMetadata::unnamed(PluginType::Forge);
    meta.name = display_name
        .or(mod_id)
        .unwrap_or_else(|| "Forge Mod".to_string());
    meta.version = version.filter(|v| v != FORGE_JAR_VERSION_PLACEHOLDER);
    meta.description = description.unwrap_or_default();
    meta
}
