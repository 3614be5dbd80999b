pub mod extractor;
pub mod fallback;
pub mod model;

pub use extractor::{extract_metadata, MANIFEST_ENTRIES};
pub use model::PluginMetadata;
