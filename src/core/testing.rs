//! Scripted stand-ins for registries, downloads and time, shared by the
//! unit tests.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::core::cache::Clock;
use crate::core::error::{PluginError, PluginResult};
use crate::core::install::ArchiveFetcher;
use crate::core::sources::{
    PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, SearchQuery, SourceAdapter,
    SourceKind,
};

// ── Registry data ───────────────────────────────────────

pub fn descriptor(source: SourceKind, id: &str) -> PluginDescriptor {
    PluginDescriptor::bare(source, id, id)
}

/// A version with a direct link to `https://fake.test/<id>-<ver>.jar`.
pub fn version(plugin_id: &str, version_number: &str) -> PluginVersion {
    let file = format!("{}-{}.jar", plugin_id, version_number);
    PluginVersion {
        id: format!("{}-{}", plugin_id, version_number),
        version_number: version_number.to_string(),
        download_url: Some(format!("https://fake.test/{}", file)),
        filename: Some(file),
        ..Default::default()
    }
}

/// In-memory registry. Search returns every hit regardless of the query.
pub struct FakeSource {
    kind: SourceKind,
    available: bool,
    hits: Vec<PluginDescriptor>,
    versions: HashMap<String, Vec<PluginVersion>>,
    dependencies: HashMap<String, Vec<String>>,
    search_calls: Arc<AtomicUsize>,
}

impl FakeSource {
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            available: true,
            hits: Vec::new(),
            versions: HashMap::new(),
            dependencies: HashMap::new(),
            search_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_hit(mut self, hit: PluginDescriptor) -> Self {
        self.hits.push(hit);
        self
    }

    pub fn with_versions(mut self, plugin_id: &str, versions: Vec<PluginVersion>) -> Self {
        self.versions.insert(plugin_id.to_string(), versions);
        self
    }

    /// `plugin_id` requires `dependency_id` from the same registry.
    pub fn with_dependency(mut self, plugin_id: &str, dependency_id: &str) -> Self {
        self.dependencies
            .entry(plugin_id.to_string())
            .or_default()
            .push(dependency_id.to_string());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    pub fn search_calls(&self) -> Arc<AtomicUsize> {
        self.search_calls.clone()
    }
}

#[async_trait]
impl SourceAdapter for FakeSource {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn is_available(&self) -> bool {
        self.available
    }

    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        self.hits
            .iter()
            .take(query.limit as usize)
            .cloned()
            .collect()
    }

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo> {
        self.hits
            .iter()
            .find(|hit| hit.id == plugin_id)
            .cloned()
            .map(PluginInfo::from_descriptor)
    }

    async fn get_versions(
        &self,
        plugin_id: &str,
        _game_version: Option<&str>,
    ) -> Vec<PluginVersion> {
        self.versions.get(plugin_id).cloned().unwrap_or_default()
    }

    async fn get_download_url(&self, plugin_id: &str, version: &PluginVersion) -> Option<String> {
        Some(format!(
            "https://fake.test/{}/{}/download",
            plugin_id, version.version_number
        ))
    }

    async fn get_dependencies(
        &self,
        plugin_id: &str,
        _game_version: Option<&str>,
    ) -> Vec<PluginDependency> {
        self.dependencies
            .get(plugin_id)
            .map(|ids| {
                ids.iter()
                    .map(|id| PluginDependency {
                        name: id.clone(),
                        plugin_id: id.clone(),
                        required: true,
                        version_range: String::new(),
                        source: self.kind,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

// ── Downloads ───────────────────────────────────────────

/// Serves archive bytes by URL and counts every fetch. Unknown URLs are a
/// 404.
#[derive(Default)]
pub struct FakeFetcher {
    archives: Mutex<HashMap<String, Vec<u8>>>,
    fetches: AtomicUsize,
    per_url: Mutex<HashMap<String, usize>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_archive(self, url: &str, bytes: Vec<u8>) -> Self {
        self.archives.lock().insert(url.to_string(), bytes);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fetch_count_for(&self, url: &str) -> usize {
        self.per_url.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ArchiveFetcher for FakeFetcher {
    async fn fetch(&self, url: &str, dest: &Path, _sha1: Option<&str>) -> PluginResult<u64> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        *self.per_url.lock().entry(url.to_string()).or_default() += 1;
        // Yield so concurrent installs interleave the way real downloads do.
        tokio::task::yield_now().await;
        let bytes = self
            .archives
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| PluginError::DownloadFailed {
                url: url.to_string(),
                status: 404,
            })?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| PluginError::io(parent, e))?;
        }
        tokio::fs::write(dest, &bytes)
            .await
            .map_err(|e| PluginError::io(dest, e))?;
        Ok(bytes.len() as u64)
    }
}

// ── HTTP ────────────────────────────────────────────

/// Base URL of a local server answering every request with the same
/// status, headers and body.
pub async fn http_stub(status: u16, headers: &[(&str, &str)], body: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut response = format!("HTTP/1.1 {} Stub\r\n", status);
    for (name, value) in headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let response = response.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Nothing listens on the discard port.
pub const UNREACHABLE: &str = "http://127.0.0.1:9";

/// Every lookup against a registry that is down comes back empty.
pub async fn assert_fails_soft(adapter: &dyn SourceAdapter, plugin_id: &str) {
    let query = SearchQuery::new("worldedit").game_version(Some("1.20.4"));
    assert!(adapter.search(&query).await.is_empty());
    assert!(adapter.get_info(plugin_id).await.is_none());
    assert!(adapter.get_versions(plugin_id, Some("1.20.4")).await.is_empty());
    assert!(adapter.get_dependencies(plugin_id, Some("1.20.4")).await.is_empty());
}

// ── Time ────────────────────────────────────────────────

pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Utc::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        let step = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        *self.now.lock() += step;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ── Archives ────────────────────────────────────────────

/// Zip with the given entries, stored uncompressed so tests can find and
/// damage member bytes.
pub fn jar_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    for (name, content) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(content.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn plugin_yml_jar(name: &str, version: &str, depends: &[&str]) -> Vec<u8> {
    let mut yml = format!(
        "name: {}\nversion: '{}'\nmain: com.example.{}\n",
        name, version, name
    );
    if !depends.is_empty() {
        yml.push_str(&format!("depend: [{}]\n", depends.join(", ")));
    }
    jar_bytes(&[
        ("plugin.yml", yml.as_str()),
        ("com/example/Main.class", "cafebabe"),
    ])
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}
