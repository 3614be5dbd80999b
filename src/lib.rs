mod commands;
pub mod core;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub fn run() {
    // Initialize structured logging; stdout is reserved for JSON output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,mcserver_plugins_lib=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = commands::Cli::parse();
    tracing::debug!("mcserver-plugins {} starting", env!("CARGO_PKG_VERSION"));

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to start async runtime: {}", e);
            std::process::exit(2);
        }
    };

    match runtime.block_on(commands::dispatch(cli)) {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            tracing::error!("{}", e);
            std::process::exit(2);
        }
    }
}
