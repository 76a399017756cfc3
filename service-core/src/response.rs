//! Uniform JSON envelope returned by every endpoint.

use serde::Serialize;

/// `{ success, message, data, errors }`
///
/// `data` is always present in the serialized form (`null` on failure) so
/// clients can rely on a fixed shape.
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: String,
    pub data: Option<T>,
    pub errors: Vec<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
            errors: Vec::new(),
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
            errors: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
            errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_serializes_null_data() {
        let body = serde_json::to_value(ApiResponse::failure("nope", vec!["bad".into()])).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["data"].is_null());
        assert_eq!(body["errors"][0], "bad");
    }

    #[test]
    fn test_ok_carries_payload() {
        let body = serde_json::to_value(ApiResponse::ok(42, "done")).unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"], 42);
        assert_eq!(body["errors"].as_array().map(Vec::len), Some(0));
    }
}
