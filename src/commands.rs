use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::install::{DownloadProgress, OperationResult, PluginManager};
use crate::core::sources::SourceKind;
use crate::core::state::{AppState, PluginSettings};

#[derive(Parser)]
#[command(name = "mcserver-plugins")]
#[command(about = "Find, install, update and validate Minecraft server plugins")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Server platform (paper, spigot, purpur, velocity, fabric, ...)
    #[arg(long, global = true)]
    platform: Option<String>,

    /// Minecraft version the server runs
    #[arg(long, global = true)]
    mc_version: Option<String>,

    /// Plugin directory of the server
    #[arg(long, global = true)]
    plugins_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Search the registries that fit the server platform
    Search {
        query: String,

        /// Restrict to these registries (modrinth, hangar, spigotmc, curseforge)
        #[arg(long = "source")]
        sources: Vec<String>,

        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// Show details of one plugin
    Info { source: String, id: String },

    /// List versions of one plugin for the server's game version
    Versions { source: String, id: String },

    /// Install a plugin by name
    Install {
        name: String,

        /// Version id or version number
        #[arg(long)]
        version: Option<String>,

        /// Skip required dependencies
        #[arg(long)]
        no_deps: bool,

        /// Prefer results from this registry
        #[arg(long)]
        source: Option<String>,
    },

    /// Update one plugin, or every plugin with --all
    Update {
        name: Option<String>,

        #[arg(long)]
        all: bool,
    },

    /// List plugins with a newer version available
    CheckUpdates,

    /// Remove a plugin, keeping a backup of its archive
    Uninstall { name: String },

    /// List installed plugins
    List,

    /// Install a local .jar file
    InstallFile { path: PathBuf },

    /// Validate one archive, or the whole plugin directory
    Validate { path: Option<PathBuf> },

    /// Put the newest backup of a plugin back in place
    RestoreBackup { name: String },

    /// Drop cached registry responses
    ClearCache,
}

impl Cli {
    fn apply(&self, settings: &mut PluginSettings) {
        if let Some(platform) = &self.platform {
            settings.server.platform = platform.trim().to_lowercase();
        }
        if let Some(version) = &self.mc_version {
            settings.server.game_version = version.clone();
        }
        if let Some(dir) = &self.plugins_dir {
            settings.server.plugins_dir = dir.clone();
        }
    }
}

/// Run one CLI command. `Ok(false)` when the operation itself failed.
pub async fn dispatch(cli: Cli) -> Result<bool, String> {
    let state = AppState::new();
    let mut settings = state.settings.clone();
    cli.apply(&mut settings);
    debug!("Data directory: {:?}", state.data_dir);

    let (progress_tx, progress_rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(report_progress(progress_rx));

    let manager = PluginManager::from_settings(&settings, Some(progress_tx))
        .await
        .map_err(|e| e.to_string())?;

    let outcome = run_command(&manager, cli.command).await;
    drop(manager);
    let _ = progress.await;
    outcome
}

async fn run_command(manager: &PluginManager, command: Command) -> Result<bool, String> {
    match command {
        Command::Search {
            query,
            sources,
            limit,
        } => {
            let results = if sources.is_empty() {
                manager.search(&query, None, None, limit).await
            } else {
                let kinds = parse_sources(&sources)?;
                manager.search_in(&kinds, &query, None, limit).await
            };
            print_json(&results)?;
            Ok(true)
        }
        Command::Info { source, id } => {
            let kind = parse_source(&source)?;
            match manager.info(kind, &id).await {
                Some(info) => {
                    print_json(&info)?;
                    Ok(true)
                }
                None => Err(format!("Plugin not found: {}:{}", source, id)),
            }
        }
        Command::Versions { source, id } => {
            let kind = parse_source(&source)?;
            print_json(&manager.versions(kind, &id).await)?;
            Ok(true)
        }
        Command::Install {
            name,
            version,
            no_deps,
            source,
        } => {
            let preferred = source.as_deref().map(parse_source).transpose()?;
            let result = manager
                .install(name, version.as_deref(), !no_deps, preferred)
                .await;
            print_result(&result)
        }
        Command::Update { name, all } => match (name, all) {
            (Some(name), _) => print_result(&manager.update(&name).await),
            (None, true) => {
                let mut results = Vec::new();
                for name in manager.check_updates().await.into_keys() {
                    results.push(manager.update(&name).await);
                }
                print_json(&results)?;
                Ok(results.iter().all(|r| r.success))
            }
            (None, false) => Err("Name a plugin or pass --all".to_string()),
        },
        Command::CheckUpdates => {
            let updates = manager.check_updates().await;
            info!("{} update(s) available", updates.len());
            print_json(&updates)?;
            Ok(true)
        }
        Command::Uninstall { name } => print_result(&manager.uninstall(&name).await),
        Command::List => {
            let records = manager.list().await.map_err(|e| e.to_string())?;
            print_json(&records)?;
            Ok(true)
        }
        Command::InstallFile { path } => print_result(&manager.install_from_file(&path).await),
        Command::Validate { path } => match path {
            Some(path) => {
                let result = manager.validate(&path).await;
                print_json(&result)?;
                Ok(result.is_valid)
            }
            None => {
                let results = manager.validate_all().await;
                print_json(&results)?;
                Ok(results.iter().all(|r| r.is_valid))
            }
        },
        Command::RestoreBackup { name } => {
            print_result(&manager.restore_latest_backup(&name).await)
        }
        Command::ClearCache => {
            manager.clear_cache();
            print_result(&OperationResult::ok("Cache cleared"))
        }
    }
}

fn parse_source(raw: &str) -> Result<SourceKind, String> {
    raw.parse().map_err(|e: crate::core::error::PluginError| e.to_string())
}

fn parse_sources(raw: &[String]) -> Result<Vec<SourceKind>, String> {
    raw.iter().map(|s| parse_source(s)).collect()
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", json);
    Ok(())
}

fn print_result(result: &OperationResult) -> Result<bool, String> {
    print_json(result)?;
    Ok(result.success)
}

async fn report_progress(mut rx: mpsc::UnboundedReceiver<DownloadProgress>) {
    while let Some(p) = rx.recv().await {
        match p.total_bytes {
            Some(total) if p.bytes_downloaded >= total => {
                eprintln!("\r{}: {} bytes", p.file_name, total);
            }
            Some(total) => eprint!("\r{}: {}/{} bytes", p.file_name, p.bytes_downloaded, total),
            None => eprint!("\r{}: {} bytes", p.file_name, p.bytes_downloaded),
        }
    }
}
