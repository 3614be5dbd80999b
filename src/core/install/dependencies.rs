use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::outcome::OperationResult;
use crate::core::sources::{PluginDescriptor, SourceKind, SourceSet};

/// State threaded through one install chain: the root plugin plus every
/// dependency installed on its behalf.
#[derive(Debug, Default)]
pub struct InstallChain {
    visited: HashSet<String>,
    /// Lowercased names whose lock this chain already owns.
    held: HashSet<String>,
    /// Names of plugins committed so far in this chain.
    installed: Vec<String>,
}

impl InstallChain {
    pub fn new(root: &PluginDescriptor) -> Self {
        let mut chain = Self::default();
        chain.visited.insert(root.chain_key());
        chain.held.insert(root.name.to_lowercase());
        chain
    }

    /// Claim `name` for this chain. False when the chain holds it already,
    /// in which case its lock must not be taken again.
    pub fn hold(&mut self, name: &str) -> bool {
        self.held.insert(name.to_lowercase())
    }

    pub fn release(&mut self, name: &str) {
        self.held.remove(&name.to_lowercase());
    }

    /// Mark a plugin as processed. False when it already was.
    pub fn visit(&mut self, source: SourceKind, id: &str) -> bool {
        self.visited.insert(format!("{}:{}", source, id))
    }

    pub fn record_installed(&mut self, name: impl Into<String>) {
        self.installed.push(name.into());
    }

    pub fn installed_names(&self) -> &[String] {
        &self.installed
    }
}

/// What the dependency-resolution pass needs from the install machinery.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    async fn is_installed(&self, source: SourceKind, source_id: &str) -> bool;

    /// Install one dependency, resolving its own dependencies too.
    async fn install_dependency(
        &self,
        plugin: PluginDescriptor,
        chain: &mut InstallChain,
    ) -> OperationResult;
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DependencyReport {
    pub installed: Vec<String>,
    pub failed: Vec<String>,
}

impl DependencyReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Discovers required companions of a plugin and installs the missing
/// ones. Failures are collected, never propagated.
#[derive(Clone)]
pub struct DependencyResolver {
    sources: SourceSet,
}

impl DependencyResolver {
    pub fn new(sources: SourceSet) -> Self {
        Self { sources }
    }

    pub async fn resolve_and_install(
        &self,
        plugin: &PluginDescriptor,
        game_version: Option<&str>,
        installer: &dyn DependencyInstaller,
        chain: &mut InstallChain,
    ) -> DependencyReport {
        let mut report = DependencyReport::default();
        let Some(adapter) = self.sources.get(plugin.source) else {
            return report;
        };

        let dependencies: Vec<_> = adapter
            .get_dependencies(&plugin.id, game_version)
            .await
            .into_iter()
            .filter(|d| d.required)
            .collect();
        if dependencies.is_empty() {
            debug!("No dependencies required for {}", plugin.name);
            return report;
        }

        for dep in dependencies {
            if installer.is_installed(dep.source, &dep.plugin_id).await {
                debug!("Dependency {} already installed", dep.plugin_id);
                continue;
            }
            if !chain.visit(dep.source, &dep.plugin_id) {
                debug!("Dependency {} already processed in this chain", dep.plugin_id);
                continue;
            }
            if !dep.version_range.is_empty() {
                debug!(
                    "Dependency {} asks for '{}', installing newest",
                    dep.plugin_id, dep.version_range
                );
            }

            info!("Installing dependency {} for {}", dep.plugin_id, plugin.name);
            let Some(adapter) = self.sources.get(dep.source) else {
                report.failed.push(dep.plugin_id);
                continue;
            };
            let Some(info) = adapter.get_info(&dep.plugin_id).await else {
                warn!("Could not find dependency {}", dep.plugin_id);
                report.failed.push(dep.plugin_id);
                continue;
            };

            let mut descriptor = info.descriptor;
            descriptor.source = dep.source;
            let name = descriptor.name.clone();

            let result = installer.install_dependency(descriptor, chain).await;
            if result.success {
                report.installed.push(name);
            } else {
                warn!("Failed to install dependency {}: {}", dep.plugin_id, result.message);
                report.failed.push(dep.plugin_id);
            }
        }

        report
    }
}
