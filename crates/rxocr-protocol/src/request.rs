//! Request types for CLI to daemon communication.

use serde::{Deserialize, Serialize};

/// A request from the CLI to the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Recognize the text on a prescription image.
    Recognize(RecognizeRequest),

    /// Get session info.
    SessionInfo,

    /// Ping the daemon (for health checks).
    Ping,

    /// Shutdown the daemon gracefully.
    Shutdown,
}

/// Image to recognize. Exactly one source must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecognizeRequest {
    /// Path readable by the daemon process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Base64-encoded PNG or JPEG bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_base64: Option<String>,
}

impl RecognizeRequest {
    /// Recognize a file on disk.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            image_base64: None,
        }
    }

    /// Recognize in-band image bytes that were already base64-encoded.
    pub fn from_base64(data: impl Into<String>) -> Self {
        Self {
            path: None,
            image_base64: Some(data.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognize_request_shape() {
        let req = Request::Recognize(RecognizeRequest::from_path("test/1.jpg"));
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(json, r#"{"type":"recognize","path":"test/1.jpg"}"#);
    }

    #[test]
    fn test_unit_requests_parse() {
        let req: Request = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(req, Request::Ping));

        let req: Request = serde_json::from_str(r#"{"type":"session_info"}"#).unwrap();
        assert!(matches!(req, Request::SessionInfo));
    }

    #[test]
    fn test_recognize_without_source_parses() {
        // Validation happens in the daemon, not at the protocol layer.
        let req: Request = serde_json::from_str(r#"{"type":"recognize"}"#).unwrap();
        match req {
            Request::Recognize(r) => {
                assert!(r.path.is_none());
                assert!(r.image_base64.is_none());
            }
            _ => panic!("Expected Recognize request"),
        }
    }
}
