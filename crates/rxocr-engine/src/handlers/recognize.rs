//! Recognition handler.

use std::path::PathBuf;
use std::sync::Arc;

use base64::Engine;
use rxocr_protocol::{ErrorCode, RecognizeRequest, Response, ResponseData};
use tracing::{debug, warn};

use crate::recognizer::{ImageInput, Recognizer};

/// Handle a recognize request.
pub async fn handle(recognizer: &Arc<Recognizer>, params: RecognizeRequest) -> Response {
    let input = match image_input(params) {
        Ok(input) => input,
        Err(message) => return Response::error(ErrorCode::InvalidRequest, message),
    };

    if let ImageInput::Path(ref path) = input {
        debug!("Recognize request for {:?}", path);
    } else {
        debug!("Recognize request with in-band image");
    }

    // Recognition is CPU-bound; keep it off the async workers
    let recognizer = Arc::clone(recognizer);
    let result = tokio::task::spawn_blocking(move || recognizer.recognize(&input)).await;

    match result {
        Ok(Ok(recognition)) => Response::success(ResponseData::Recognition(recognition)),
        Ok(Err(e)) => {
            warn!("{}", e);
            Response::error(e.code(), e.to_string())
        }
        Err(e) => Response::error(
            ErrorCode::InternalError,
            format!("Recognition task failed: {}", e),
        ),
    }
}

/// Resolve the request to exactly one image source.
fn image_input(params: RecognizeRequest) -> Result<ImageInput, String> {
    match (params.path, params.image_base64) {
        (Some(path), None) => {
            if path.is_empty() {
                return Err("Image path is empty".to_string());
            }
            Ok(ImageInput::Path(PathBuf::from(path)))
        }
        (None, Some(data)) => base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map(ImageInput::Bytes)
            .map_err(|e| format!("Invalid base64 image data: {}", e)),
        (Some(_), Some(_)) => Err("Specify either path or image_base64, not both".to_string()),
        (None, None) => Err("Missing image: specify path or image_base64".to_string()),
    }
}
