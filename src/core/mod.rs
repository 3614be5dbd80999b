// ─── Plugin Engine Core ───
// Acquisition and lifecycle of Minecraft server plugins.
//
// Architecture:
//   core/
//     sources/    : Modrinth, Hangar, Spiget, CurseForge adapters
//     cache/      : TTL response cache shared by the adapters
//     search/     : Platform → registry table + merged search
//     version/    : Version selection, game version parsing
//     manifest/   : plugin.yml / velocity / fabric / mods.toml reader
//     validator/  : Archive integrity + compatibility checks
//     registry/   : Installed plugin table + backups
//     install/    : Transactions, dependencies, plugin manager
//     state/      : Settings, data dir, server config

pub mod cache;
pub mod error;
pub mod http;
pub mod install;
pub mod manifest;
pub mod platform;
pub mod registry;
pub mod search;
pub mod sources;
pub mod state;
pub mod validator;
pub mod version;

#[cfg(test)]
pub(crate) mod testing;
