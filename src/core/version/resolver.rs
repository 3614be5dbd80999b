use serde::Serialize;
use tracing::{debug, warn};

use crate::core::sources::{PluginDescriptor, PluginVersion, SourceSet};

/// Outcome of picking a version. An empty result (no URL, empty version
/// string) is a normal answer, not an error.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResolvedVersion {
    pub version: String,
    pub download_url: Option<String>,
    pub entry: Option<PluginVersion>,
}

impl ResolvedVersion {
    pub fn is_resolved(&self) -> bool {
        self.download_url.is_some()
    }
}

/// Picks the version to install and turns it into a concrete download URL.
#[derive(Clone)]
pub struct VersionResolver {
    sources: SourceSet,
}

impl VersionResolver {
    pub fn new(sources: SourceSet) -> Self {
        Self { sources }
    }

    /// An explicit selector matches a version id or its display version;
    /// without one, or when nothing matches, the newest version is used.
    pub async fn resolve(
        &self,
        plugin: &PluginDescriptor,
        game_version: Option<&str>,
        explicit: Option<&str>,
    ) -> ResolvedVersion {
        let Some(adapter) = self.sources.get(plugin.source) else {
            warn!("No adapter for source {}", plugin.source);
            return ResolvedVersion::default();
        };

        let versions = adapter.get_versions(&plugin.id, game_version).await;
        let Some(target) = select_version(&versions, explicit) else {
            debug!("No versions of {} ({}) for {:?}", plugin.name, plugin.source, game_version);
            return ResolvedVersion::default();
        };

        let download_url = match &target.download_url {
            Some(url) => Some(url.clone()),
            None => adapter.get_download_url(&plugin.id, target).await,
        };

        ResolvedVersion {
            version: target.version_number.clone(),
            download_url,
            entry: Some(target.clone()),
        }
    }
}

fn select_version<'a>(
    versions: &'a [PluginVersion],
    explicit: Option<&str>,
) -> Option<&'a PluginVersion> {
    let newest = versions.first()?;
    let Some(wanted) = explicit else {
        return Some(newest);
    };
    let found = versions
        .iter()
        .find(|v| v.id == wanted || v.version_number == wanted);
    if found.is_none() {
        debug!("Version '{}' not listed, using newest {}", wanted, newest.version_number);
    }
    Some(found.unwrap_or(newest))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::sources::SourceKind;
    use crate::core::testing::{descriptor, version, FakeSource};

    fn resolver(fake: FakeSource) -> VersionResolver {
        VersionResolver::new(SourceSet::new().with(fake))
    }

    #[tokio::test]
    async fn newest_version_is_default() {
        let fake = FakeSource::new(SourceKind::Modrinth)
            .with_versions("ess", vec![version("ess", "2.0"), version("ess", "1.0")]);
        let resolved = resolver(fake)
            .resolve(&descriptor(SourceKind::Modrinth, "ess"), Some("1.20.1"), None)
            .await;
        assert_eq!(resolved.version, "2.0");
        assert!(resolved.is_resolved());
    }

    #[tokio::test]
    async fn explicit_selector_matches_id_or_version_and_falls_back() {
        let mut old = version("ess", "1.0");
        old.id = "v-old".into();
        let fake = FakeSource::new(SourceKind::Modrinth)
            .with_versions("ess", vec![version("ess", "2.0"), old]);
        let resolver = resolver(fake);
        let plugin = descriptor(SourceKind::Modrinth, "ess");

        assert_eq!(resolver.resolve(&plugin, None, Some("v-old")).await.version, "1.0");
        assert_eq!(resolver.resolve(&plugin, None, Some("1.0")).await.version, "1.0");
        assert_eq!(resolver.resolve(&plugin, None, Some("9.9")).await.version, "2.0");
    }

    #[tokio::test]
    async fn missing_link_goes_through_adapter() {
        let mut v = version("chunky", "1.3");
        v.download_url = None;
        let fake = FakeSource::new(SourceKind::Hangar).with_versions("chunky", vec![v]);
        let resolved = resolver(fake)
            .resolve(&descriptor(SourceKind::Hangar, "chunky"), None, None)
            .await;
        assert_eq!(
            resolved.download_url.as_deref(),
            Some("https://fake.test/chunky/1.3/download")
        );
    }

    #[tokio::test]
    async fn empty_listing_is_unresolved() {
        let resolved = resolver(FakeSource::new(SourceKind::Modrinth))
            .resolve(&descriptor(SourceKind::Modrinth, "ghost"), None, None)
            .await;
        assert!(!resolved.is_resolved());
        assert!(resolved.version.is_empty());
        assert!(resolved.entry.is_none());
    }
}
