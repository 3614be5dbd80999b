use async_trait::async_trait;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use tracing::{error, warn};

use super::model::{PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, SourceKind};
use crate::core::platform::Platform;

/// Parameters shared by every adapter's search.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub platform: Option<Platform>,
    pub game_version: Option<String>,
    pub limit: u32,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            platform: None,
            game_version: None,
            limit: 20,
        }
    }

    pub fn platform(mut self, platform: Option<Platform>) -> Self {
        self.platform = platform;
        self
    }

    pub fn game_version(mut self, version: Option<&str>) -> Self {
        self.game_version = version.map(str::to_string);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// One external plugin registry translated into the normalized model.
///
/// Implementations never fail towards the caller: network errors, timeouts
/// and non-success statuses come back as empty lists or `None`.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// False when a required credential is missing.
    fn is_available(&self) -> bool {
        true
    }

    /// Results in the registry's own popularity order.
    async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor>;

    async fn get_info(&self, plugin_id: &str) -> Option<PluginInfo>;

    /// Versions newest-first.
    async fn get_versions(&self, plugin_id: &str, game_version: Option<&str>)
        -> Vec<PluginVersion>;

    async fn get_download_url(&self, plugin_id: &str, version: &PluginVersion) -> Option<String>;

    async fn get_dependencies(
        &self,
        plugin_id: &str,
        game_version: Option<&str>,
    ) -> Vec<PluginDependency>;
}

/// Send a request and decode its JSON body, degrading every failure to
/// `None` with a log line.
pub(crate) async fn fetch_json<T: DeserializeOwned>(
    label: &str,
    request: RequestBuilder,
) -> Option<T> {
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            error!("{} request error: {}", label, e);
            return None;
        }
    };

    let status = response.status();
    if !status.is_success() {
        warn!("{} returned HTTP {}", label, status.as_u16());
        return None;
    }

    match response.json::<T>().await {
        Ok(body) => Some(body),
        Err(e) => {
            error!("{} response could not be decoded: {}", label, e);
            None
        }
    }
}
