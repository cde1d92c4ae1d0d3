//! HTTP route handlers.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{
        multipart::{Multipart, MultipartRejection},
        State,
    },
    http::{header, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::device::Device;
use crate::model::MODEL_NAME;
use crate::server::error::{ApiError, NOT_AN_IMAGE, NO_IMAGE};
use crate::server::state::AppState;

pub const IMAGE_FIELD: &str = "image";
pub const PROCESSING_TIME_HEADER: HeaderName = HeaderName::from_static("x-processing-time-ms");

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub model: &'static str,
    pub device: Device,
}

/// Liveness and model metadata. Does not run inference.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        model: MODEL_NAME,
        device: state.device(),
    })
}

/// Accepts a multipart upload and returns the image as a PNG with a transparent background.
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, ApiError> {
    let bytes = read_image_field(multipart?).await?;

    let started = Instant::now();
    let permit = Arc::clone(&state.inference_permits)
        .acquire_owned()
        .await
        .map_err(ApiError::internal)?;

    let remover = Arc::clone(&state.remover);
    let png = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        remover.remove_background(&bytes)
    })
    .await
    .map_err(ApiError::internal)??;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(elapsed_ms, output_bytes = png.len(), "background removed");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("image/png")),
            (PROCESSING_TIME_HEADER, HeaderValue::from(elapsed_ms)),
        ],
        png,
    )
        .into_response())
}

/// Finds the `image` field and returns its bytes. The declared content type is
/// checked before the body of the field is read.
async fn read_image_field(mut multipart: Multipart) -> Result<Bytes, ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        if !is_image_content_type(field.content_type()) {
            return Err(ApiError::BadRequest(NOT_AN_IMAGE));
        }
        return Ok(field.bytes().await?);
    }
    Err(ApiError::BadRequest(NO_IMAGE))
}

pub fn is_image_content_type(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("image/"))
}
