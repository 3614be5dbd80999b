pub mod game_version;
pub mod resolver;

pub use game_version::major_minor;
pub use resolver::{ResolvedVersion, VersionResolver};
