pub mod checks;
pub mod model;

pub use checks::Validator;
pub use model::{Severity, ValidationIssue, ValidationResult};
