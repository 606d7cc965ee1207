use serde::Serialize;
use serde_json::Value;

/// Shared JSON envelope for every API response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_result: Option<Value>,
}

impl ApiResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
            details: None,
            errors: None,
            test_result: None,
        }
    }

    pub fn ok_with_message(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok(data)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
            details: None,
            errors: None,
            test_result: None,
        }
    }

    pub fn error_with_details(message: impl Into<String>, details: Value) -> Self {
        Self {
            details: Some(details),
            ..Self::error(message)
        }
    }

    pub fn with_test_result(mut self, test_result: Value) -> Self {
        self.test_result = Some(test_result);
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = Some(errors);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_fields_are_omitted_from_wire_format() {
        let json = serde_json::to_value(ApiResponse::ok(serde_json::json!({"x": 1}))).unwrap();
        assert_eq!(json["success"], true);
        assert!(json.get("message").is_none());
        assert!(json.get("testResult").is_none());
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let resp = ApiResponse::error("boom").with_test_result(serde_json::json!({"a": 1}));
        let json = serde_json::to_value(resp).unwrap();
        assert_eq!(json["testResult"]["a"], 1);
    }
}
