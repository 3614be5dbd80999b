use serde::{Deserialize, Serialize};

use crate::core::manifest::PluginMetadata;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Metadata field the issue is about, empty when it concerns the file.
    #[serde(default)]
    pub field: String,
}

/// Report for one archive. `is_valid` is false iff an error was added.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub plugin_name: String,
    pub is_valid: bool,
    pub issues: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PluginMetadata>,
}

impl ValidationResult {
    pub fn new(plugin_name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            is_valid: true,
            issues: Vec::new(),
            metadata: None,
        }
    }

    fn push(&mut self, severity: Severity, message: impl Into<String>, field: &str) {
        self.issues.push(ValidationIssue {
            severity,
            message: message.into(),
            field: field.to_string(),
        });
    }

    pub fn add_error(&mut self, message: impl Into<String>, field: &str) {
        self.is_valid = false;
        self.push(Severity::Error, message, field);
    }

    pub fn add_warning(&mut self, message: impl Into<String>, field: &str) {
        self.push(Severity::Warning, message, field);
    }

    pub fn add_info(&mut self, message: impl Into<String>, field: &str) {
        self.push(Severity::Info, message, field);
    }

    pub fn with_severity(&self, severity: Severity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    /// Messages of every error, joined for a one-line failure report.
    pub fn error_summary(&self) -> String {
        self.with_severity(Severity::Error)
            .map(|i| i.message.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn warning_messages(&self) -> Vec<String> {
        self.with_severity(Severity::Warning)
            .map(|i| i.message.clone())
            .collect()
    }
}
