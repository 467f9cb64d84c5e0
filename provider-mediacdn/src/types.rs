//! API request/response payloads for the media CDN HTTP API

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Response body of `POST /resources` and `POST /resources/{id}/copy`
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub public_id: String,
    pub version: i64,
    #[serde(default = "default_delivery_type")]
    pub delivery_type: String,
    pub bytes: u64,
    pub secure_url: String,
}

fn default_delivery_type() -> String {
    "upload".to_string()
}

/// Response body of `GET /resources/{id}`
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceResponse {
    pub public_id: String,
    pub version: i64,
    #[serde(default = "default_delivery_type")]
    pub delivery_type: String,
    pub bytes: u64,
    pub secure_url: String,
}

/// Response body of `POST /resources/{id}/transform`
#[derive(Debug, Clone, Deserialize)]
pub struct TransformResponse {
    pub secure_url: String,
    pub bytes: u64,
}

/// Request body of `POST /resources/{id}/copy`
#[derive(Debug, Clone, Serialize)]
pub struct CopyRequest<'a> {
    pub to_public_id: &'a str,
}

/// Request body of `POST /resources/{id}/context`
#[derive(Debug, Clone, Serialize)]
pub struct ContextRequest {
    pub context: HashMap<String, String>,
}

/// Request body of `POST /resources/{id}/transform`
#[derive(Debug, Clone, Serialize)]
pub struct TransformRequest<'a> {
    pub transformation: &'a str,
}

/// Error envelope the API wraps failures in
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_response_defaults_delivery_type() {
        let json = r#"{
            "public_id": "media/sunset",
            "version": 3,
            "bytes": 52110,
            "secure_url": "https://cdn.example.com/media/sunset"
        }"#;
        let parsed: UploadResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.delivery_type, "upload");
        assert_eq!(parsed.version, 3);
    }

    #[test]
    fn test_error_envelope() {
        let json = r#"{"error": {"message": "public_id media/sunset already exists"}}"#;
        let parsed: ErrorResponse = serde_json::from_str(json).unwrap();
        assert!(parsed.error.message.contains("already exists"));
    }
}
