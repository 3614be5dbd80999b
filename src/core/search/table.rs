use std::collections::HashMap;

use crate::core::platform::Platform;
use crate::core::sources::SourceKind;

/// Which registries are worth asking for a given server platform, in the
/// order their results should be presented when download counts tie.
#[derive(Debug, Clone)]
pub struct PlatformSourceTable {
    entries: HashMap<Platform, Vec<SourceKind>>,
    /// Used when the platform is unknown.
    fallback: Vec<SourceKind>,
}

impl Default for PlatformSourceTable {
    fn default() -> Self {
        use SourceKind::*;

        let entries = HashMap::from([
            (Platform::Paper, vec![Modrinth, Hangar, SpigotMc]),
            (Platform::Spigot, vec![SpigotMc, Modrinth]),
            (Platform::Purpur, vec![Hangar, Modrinth, SpigotMc]),
            (Platform::Fabric, vec![Modrinth, CurseForge]),
            (Platform::Forge, vec![CurseForge, Modrinth]),
            (Platform::Quilt, vec![Modrinth]),
            (Platform::Vanilla, vec![]),
            (Platform::Velocity, vec![Hangar, Modrinth]),
            (Platform::BungeeCord, vec![SpigotMc]),
        ]);

        Self {
            entries,
            fallback: vec![Modrinth],
        }
    }
}

impl PlatformSourceTable {
    pub fn sources_for(&self, platform: Option<Platform>) -> &[SourceKind] {
        platform
            .and_then(|p| self.entries.get(&p))
            .unwrap_or(&self.fallback)
    }

    /// Replace the registry list for one platform.
    pub fn set(&mut self, platform: Platform, sources: Vec<SourceKind>) {
        self.entries.insert(platform, sources);
    }

    pub fn with(mut self, platform: Platform, sources: Vec<SourceKind>) -> Self {
        self.set(platform, sources);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_platform_families() {
        let table = PlatformSourceTable::default();
        assert_eq!(
            table.sources_for(Some(Platform::Paper)),
            &[SourceKind::Modrinth, SourceKind::Hangar, SourceKind::SpigotMc]
        );
        assert_eq!(
            table.sources_for(Some(Platform::Forge)),
            &[SourceKind::CurseForge, SourceKind::Modrinth]
        );
        assert!(table.sources_for(Some(Platform::Vanilla)).is_empty());
    }

    #[test]
    fn unknown_platform_falls_back_to_modrinth() {
        let table = PlatformSourceTable::default();
        assert_eq!(table.sources_for(None), &[SourceKind::Modrinth]);
    }

    #[test]
    fn entries_can_be_swapped() {
        let table =
            PlatformSourceTable::default().with(Platform::Vanilla, vec![SourceKind::Hangar]);
        assert_eq!(table.sources_for(Some(Platform::Vanilla)), &[SourceKind::Hangar]);
    }
}
