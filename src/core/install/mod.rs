pub mod dependencies;
pub mod fetch;
pub mod locks;
pub mod manager;
pub mod outcome;
pub mod transaction;

pub use dependencies::{DependencyInstaller, DependencyReport, DependencyResolver, InstallChain};
pub use fetch::{ArchiveFetcher, DownloadProgress, HttpArchiveFetcher};
pub use locks::NameLocks;
pub use manager::{InstallTarget, PluginManager};
pub use outcome::OperationResult;
pub use transaction::{InstallContext, InstallRequest, InstallTransaction, TransactionState};
