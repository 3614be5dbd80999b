use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured outcome of an outer operation. Failures carry a message, an
/// error string and details; no error values cross this boundary.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OperationResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl OperationResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn fail(message: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error: Some(error.into()),
            details: Map::new(),
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.details.insert(key.to_string(), value);
        self
    }

    pub fn detail(&self, key: &str) -> Option<&Value> {
        self.details.get(key)
    }

    pub fn detail_str(&self, key: &str) -> Option<&str> {
        self.detail(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_serializes_error_and_details() {
        let result = OperationResult::fail("Download failed for X", "HTTP 404")
            .with_detail("url", "https://cdn.test/x.jar");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "HTTP 404");
        assert_eq!(json["details"]["url"], "https://cdn.test/x.jar");

        let ok = serde_json::to_value(OperationResult::ok("fine")).unwrap();
        assert!(ok.get("error").is_none());
    }
}
