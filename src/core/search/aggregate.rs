use futures_util::future::join_all;
use tracing::{debug, info, warn};

use super::table::PlatformSourceTable;
use crate::core::sources::{PluginDescriptor, SearchQuery, SourceKind, SourceSet};

/// Fans one query out to every registry applicable to the platform and
/// merges the results into a single popularity ranking.
#[derive(Clone)]
pub struct AggregateSearch {
    sources: SourceSet,
    table: PlatformSourceTable,
}

impl AggregateSearch {
    pub fn new(sources: SourceSet, table: PlatformSourceTable) -> Self {
        Self { sources, table }
    }

    pub fn table(&self) -> &PlatformSourceTable {
        &self.table
    }

    pub async fn search(&self, query: &SearchQuery) -> Vec<PluginDescriptor> {
        let kinds = self.table.sources_for(query.platform).to_vec();
        self.search_in(&kinds, query).await
    }

    /// Search an explicit list of registries, ignoring the platform table.
    pub async fn search_in(
        &self,
        kinds: &[SourceKind],
        query: &SearchQuery,
    ) -> Vec<PluginDescriptor> {
        let adapters: Vec<_> = kinds
            .iter()
            .filter_map(|kind| match self.sources.get(*kind) {
                Some(adapter) if adapter.is_available() => Some(adapter),
                Some(_) => {
                    debug!("Skipping {}: not available", kind);
                    None
                }
                None => {
                    warn!("No adapter configured for {}", kind);
                    None
                }
            })
            .collect();

        // join_all keeps input order, so equal download counts stay in
        // table order after the stable sort below.
        let batches = join_all(adapters.iter().map(|adapter| adapter.search(query))).await;

        let mut merged: Vec<PluginDescriptor> = Vec::new();
        for (adapter, batch) in adapters.iter().zip(batches) {
            debug!("{} returned {} results", adapter.kind(), batch.len());
            merged.extend(batch);
        }
        merged.sort_by(|a, b| b.downloads.cmp(&a.downloads));

        info!(
            "Search '{}' across {} sources: {} results",
            query.query,
            adapters.len(),
            merged.len()
        );
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::platform::Platform;
    use crate::core::testing::{descriptor, FakeSource};

    fn hit(source: SourceKind, id: &str, downloads: u64) -> PluginDescriptor {
        let mut d = descriptor(source, id);
        d.downloads = downloads;
        d
    }

    #[tokio::test]
    async fn merges_and_ranks_by_downloads_with_stable_ties() {
        let sources = SourceSet::new()
            .with(
                FakeSource::new(SourceKind::Modrinth)
                    .with_hit(hit(SourceKind::Modrinth, "we-modrinth", 100))
                    .with_hit(hit(SourceKind::Modrinth, "fawe-modrinth", 500)),
            )
            .with(
                FakeSource::new(SourceKind::Hangar).with_hit(hit(SourceKind::Hangar, "we-hangar", 50)),
            )
            .with(
                FakeSource::new(SourceKind::SpigotMc)
                    .with_hit(hit(SourceKind::SpigotMc, "we-spigot", 500)),
            );
        let search = AggregateSearch::new(sources, PlatformSourceTable::default());

        let query = SearchQuery::new("worldedit")
            .platform(Some(Platform::Paper))
            .game_version(Some("1.20.1"));
        let results = search.search(&query).await;

        let ids: Vec<&str> = results.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["fawe-modrinth", "we-spigot", "we-modrinth", "we-hangar"]);
    }

    #[tokio::test]
    async fn unavailable_and_missing_adapters_are_skipped() {
        let sources = SourceSet::new()
            .with(
                FakeSource::new(SourceKind::CurseForge)
                    .unavailable()
                    .with_hit(hit(SourceKind::CurseForge, "jei", 9000)),
            )
            .with(
                FakeSource::new(SourceKind::Modrinth).with_hit(hit(SourceKind::Modrinth, "sodium", 10)),
            );
        let search = AggregateSearch::new(sources, PlatformSourceTable::default());

        let query = SearchQuery::new("jei").platform(Some(Platform::Forge));
        let results = search.search(&query).await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "sodium");

        let none = search.search_in(&[SourceKind::Hangar], &query).await;
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn vanilla_queries_no_registry() {
        let fake = FakeSource::new(SourceKind::Modrinth).with_hit(hit(SourceKind::Modrinth, "x", 1));
        let calls = fake.search_calls();
        let search =
            AggregateSearch::new(SourceSet::new().with(fake), PlatformSourceTable::default());

        let query = SearchQuery::new("x").platform(Some(Platform::Vanilla));
        assert!(search.search(&query).await.is_empty());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
