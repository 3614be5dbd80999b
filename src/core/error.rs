use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the plugin engine.
/// Every fallible module returns `Result<T, PluginError>`.
#[derive(Debug, Error)]
pub enum PluginError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── Serialization ───────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    // ── Configuration ───────────────────────────────────
    #[error("Unknown server platform: {0}")]
    UnknownPlatform(String),

    #[error("Unknown plugin source: {0}")]
    UnknownSource(String),

    // ── Registry ────────────────────────────────────────
    #[error("Plugin not installed: {0}")]
    NotInstalled(String),
}

/// Convenience alias used throughout the crate.
pub type PluginResult<T> = Result<T, PluginError>;

impl PluginError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PluginError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<std::io::Error> for PluginError {
    fn from(source: std::io::Error) -> Self {
        PluginError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

// Outer surfaces (CLI JSON output) render errors as plain strings.
impl serde::Serialize for PluginError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
