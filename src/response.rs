//! Response building: image bytes or a JSON error body.

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::{Error, ImageType};

/// Generic message for rendering and internal failures
pub const CAPTURE_FAILED: &str = "Failed to capture screenshot";

/// JSON body of every error response
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Diagnostic trace; only filled outside production
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorBody {
    /// Body for `err`.
    ///
    /// Validation failures carry only their message. Everything else reports
    /// the generic failure with the underlying message as `details`.
    pub fn from_error(err: &Error, diagnostics: bool) -> Self {
        if err.is_validation() {
            return Self {
                error: err.to_string(),
                details: None,
                stack: None,
            };
        }

        Self {
            error: CAPTURE_FAILED.to_string(),
            details: Some(err.to_string()),
            stack: diagnostics.then(|| format!("{:?}", err)),
        }
    }
}

/// `200` response carrying the encoded image
pub fn image_response(data: Vec<u8>, image_type: ImageType) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, image_type.mime()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"screenshot.{}\"", image_type),
            ),
        ],
        Body::from(data),
    )
        .into_response()
}

/// `400` or `500` JSON response for `err`
pub fn error_response(err: &Error, diagnostics: bool) -> Response {
    let status = StatusCode::from_u16(err.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ErrorBody::from_error(err, diagnostics))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_body_has_only_error() {
        let body = ErrorBody::from_error(&Error::ValidationError("URL is required".into()), true);
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({ "error": "URL is required" })
        );
    }

    #[test]
    fn internal_body_has_details_and_optional_stack() {
        let err = Error::NavigationError("net::ERR_NAME_NOT_RESOLVED".into());

        let prod = ErrorBody::from_error(&err, false);
        assert_eq!(prod.error, CAPTURE_FAILED);
        assert!(prod.details.as_deref().unwrap().contains("ERR_NAME_NOT_RESOLVED"));
        assert!(prod.stack.is_none());

        let dev = ErrorBody::from_error(&err, true);
        assert!(dev.stack.as_deref().unwrap().contains("NavigationError"));
    }

    #[test]
    fn image_headers() {
        let resp = image_response(vec![1, 2, 3], ImageType::Jpeg);
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/jpeg");
        assert_eq!(
            resp.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"screenshot.jpeg\""
        );
    }

    #[test]
    fn error_statuses() {
        let resp = error_response(&Error::ValidationError("URL is required".into()), false);
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let resp = error_response(&Error::CaptureError("empty".into()), false);
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
