pub mod backup;
pub mod model;
pub mod store;

pub use backup::{archive_filename, safe_name, BackupStore};
pub use model::{InstalledPluginRecord, RegistryFile, MANUAL_SOURCE};
pub use store::Registry;
