//! Response types for daemon to CLI communication.

use crate::recognition::RecognitionResult;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A response from the daemon to the CLI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation succeeded.
    pub success: bool,

    /// Response data on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,

    /// Error details on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl Response {
    /// Create a successful response with data.
    pub fn success(data: ResponseData) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create a simple success response with no data.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: Some(ResponseData::Ok),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorInfo {
                code,
                message: message.into(),
            }),
        }
    }
}

/// Response data variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseData {
    /// Simple acknowledgment.
    Ok,

    /// Recognized prescription text.
    Recognition(RecognitionResult),

    /// Session information.
    SessionInfo(SessionInfo),

    /// List of known sessions.
    SessionList {
        /// Sessions found on disk.
        sessions: Vec<SessionSummary>,
    },

    /// Pong response for ping.
    Pong,
}

/// Daemon session information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session name.
    pub name: String,

    /// Alphabet / model language code.
    pub language: String,

    /// Models directory the daemon loads from.
    pub models_dir: String,

    /// Whether page detection runs before word detection.
    pub detect_page: bool,

    /// Word detection strategy (`contour` or `model`).
    pub word_detector: String,

    /// Whether the recognition engine has been loaded yet.
    pub engine_loaded: bool,

    /// Number of recognition requests completed.
    pub requests_served: u64,

    /// Daemon process ID.
    pub pid: u32,

    /// Time since daemon started (seconds).
    pub uptime_secs: u64,
}

/// Summary of a session for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    /// Session name.
    pub name: String,
    /// Whether the daemon process is alive.
    pub alive: bool,
    /// Language of the running daemon (if it answered).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Error information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable error message.
    pub message: String,
}

/// Error codes for structured error handling.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Invalid request parameters.
    #[error("invalid request")]
    InvalidRequest,

    /// Image could not be read or decoded.
    #[error("image error")]
    ImageError,

    /// Recognition models are missing or failed to load.
    #[error("model unavailable")]
    ModelUnavailable,

    /// The pipeline failed while processing an image.
    #[error("recognition failed")]
    RecognitionFailed,

    /// Internal daemon error.
    #[error("internal error")]
    InternalError,

    /// IPC communication error.
    #[error("ipc error")]
    IpcError,

    /// Daemon not running.
    #[error("daemon not running")]
    DaemonNotRunning,

    /// Request timed out.
    #[error("timeout")]
    Timeout,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::{BoundingBox, PageInfo, RecognizedWord};

    #[test]
    fn test_recognition_response() {
        let result = RecognitionResult::new(
            vec![RecognizedWord {
                bbox: BoundingBox::new(10, 20, 110, 60),
                text: "Paralen".to_string(),
                chars: 7,
            }],
            PageInfo {
                width: 800,
                height: 1100,
                detected: true,
            },
        );
        let resp = Response::success(ResponseData::Recognition(result));

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":true"));
        assert!(json.contains("\"type\":\"recognition\""));
        assert!(json.contains("\"text\":\"Paralen\""));
        assert!(json.contains("\"x1\":10"));
    }

    #[test]
    fn test_error_response() {
        let resp = Response::error(ErrorCode::ModelUnavailable, "CharClassifier.rten not found");

        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"success\":false"));
        assert!(json.contains("\"code\":\"model_unavailable\""));
        assert!(!json.contains("\"data\""));
    }

    #[test]
    fn test_response_parses_back() {
        let json = r#"{"success":true,"data":{"type":"pong"}}"#;
        let resp: Response = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert!(matches!(resp.data, Some(ResponseData::Pong)));
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(ErrorCode::ImageError.to_string(), "image error");
        assert_eq!(ErrorCode::DaemonNotRunning.to_string(), "daemon not running");
    }
}
