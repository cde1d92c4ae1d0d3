//! API error types and Axum response conversion.

use axum::{
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::BgRemovalError;

pub const NOT_AN_IMAGE: &str = "File must be an image";
pub const NO_IMAGE: &str = "No image provided";
pub const MALFORMED_UPLOAD: &str = "Malformed multipart upload";
pub const TOO_LARGE: &str = "Image exceeds maximum size";
pub const DECODE_FAILED: &str = "Background removal failed: image could not be decoded";
pub const INFERENCE_FAILED: &str = "Background removal failed: inference error";
pub const INTERNAL_FAILURE: &str = "Background removal failed: internal error";

/// Client-facing errors. Details are fixed strings; the underlying cause is
/// logged when the error is created and never echoed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    BadRequest(&'static str),
    PayloadTooLarge,
    DecodeFailed,
    InferenceFailed,
    Internal,
}

impl ApiError {
    pub fn internal(e: impl std::fmt::Display) -> Self {
        tracing::error!(error = %e, "background removal failed");
        ApiError::Internal
    }

    pub const fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DecodeFailed | ApiError::InferenceFailed | ApiError::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub const fn detail(&self) -> &'static str {
        match self {
            ApiError::BadRequest(detail) => *detail,
            ApiError::PayloadTooLarge => TOO_LARGE,
            ApiError::DecodeFailed => DECODE_FAILED,
            ApiError::InferenceFailed => INFERENCE_FAILED,
            ApiError::Internal => INTERNAL_FAILURE,
        }
    }
}

impl From<BgRemovalError> for ApiError {
    fn from(e: BgRemovalError) -> Self {
        let api_error = match &e {
            BgRemovalError::ImageTooLarge { .. } => ApiError::PayloadTooLarge,
            BgRemovalError::Decode { .. } | BgRemovalError::InvalidInput { .. } => {
                ApiError::DecodeFailed
            }
            BgRemovalError::Inference { .. } => ApiError::InferenceFailed,
            _ => ApiError::Internal,
        };
        if api_error.status().is_server_error() {
            tracing::error!(error = ?e, "background removal failed");
        } else {
            tracing::warn!(error = %e, "rejected upload");
        }
        api_error
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        tracing::warn!(error = %e, "failed to read multipart upload");
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge
        } else {
            ApiError::BadRequest(MALFORMED_UPLOAD)
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(e: MultipartRejection) -> Self {
        tracing::warn!(error = %e, "request is not multipart/form-data");
        ApiError::BadRequest(MALFORMED_UPLOAD)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status(),
            Json(ErrorResponse {
                detail: self.detail(),
            }),
        )
            .into_response()
    }
}
