pub mod app_state;
pub mod server;

pub use app_state::{AppState, PluginSettings};
pub use server::{ServerConfig, ServerConfigProvider, REGISTRY_FILE};
