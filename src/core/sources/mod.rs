pub mod adapter;
pub mod curseforge;
pub mod hangar;
pub mod model;
pub mod modrinth;
pub mod spigot;

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

pub use adapter::{SearchQuery, SourceAdapter};
pub use curseforge::CurseForgeSource;
pub use hangar::HangarSource;
pub use model::{
    PluginDependency, PluginDescriptor, PluginInfo, PluginVersion, ReleaseChannel, SourceKind,
};
pub use modrinth::ModrinthSource;
pub use spigot::SpigotSource;

use crate::core::cache::ResponseCache;
use crate::core::platform::Platform;

/// Every configured adapter, addressable by its kind.
#[derive(Clone, Default)]
pub struct SourceSet {
    adapters: HashMap<SourceKind, Arc<dyn SourceAdapter>>,
}

impl SourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The four public registries sharing one client and one cache.
    pub fn standard(
        client: Client,
        probe_client: Client,
        cache: Arc<ResponseCache>,
        platform: Option<Platform>,
        curseforge_api_key: Option<String>,
    ) -> Self {
        Self::new()
            .with(ModrinthSource::new(client.clone(), cache.clone()))
            .with(
                HangarSource::new(client.clone(), probe_client, cache.clone())
                    .with_platform(platform),
            )
            .with(SpigotSource::new(client.clone(), cache.clone()))
            .with(CurseForgeSource::new(client, cache, curseforge_api_key))
    }

    pub fn with(mut self, adapter: impl SourceAdapter + 'static) -> Self {
        self.insert(Arc::new(adapter));
        self
    }

    pub fn insert(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: SourceKind) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&kind).cloned()
    }

    pub fn kinds(&self) -> impl Iterator<Item = SourceKind> + '_ {
        self.adapters.keys().copied()
    }
}
