//! Error-to-response mapping for the HTTP layer

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use crownscope_eye::VisionError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal processing error";
const INTERNAL_ERROR_DETAILS: &str = "Internal processing error occurred";

#[derive(Error, Debug)]
pub enum ApiError {
    /// Caller sent something we cannot analyze.
    #[error("{0}")]
    InvalidInput(String),

    #[error("Upload exceeds the {0} byte limit")]
    PayloadTooLarge(usize),

    #[error("Segmentation model is not loaded")]
    ModelUnavailable,

    /// Decode, inference or measurement failed. The detail is logged, never returned.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<VisionError> for ApiError {
    fn from(err: VisionError) -> Self {
        match err {
            VisionError::ModelNotLoaded => ApiError::ModelUnavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Internal(detail) => {
                error!("Processing failed: {}", detail);
                json!({
                    "success": false,
                    "error": INTERNAL_ERROR_MESSAGE,
                    "details": INTERNAL_ERROR_DETAILS,
                })
            }
            other => json!({ "error": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::InvalidInput("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::PayloadTooLarge(10).status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ApiError::ModelUnavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_vision_error_mapping() {
        assert!(matches!(
            ApiError::from(VisionError::ModelNotLoaded),
            ApiError::ModelUnavailable
        ));
        assert!(matches!(
            ApiError::from(VisionError::Processing("bad tensor".into())),
            ApiError::Internal(_)
        ));
    }

    #[test]
    fn test_invalid_input_message_passthrough() {
        let err = ApiError::InvalidInput("File must be an image".into());
        assert_eq!(err.to_string(), "File must be an image");
    }
}
