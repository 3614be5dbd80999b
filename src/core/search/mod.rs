pub mod aggregate;
pub mod table;

pub use aggregate::AggregateSearch;
pub use table::PlatformSourceTable;
