use std::path::PathBuf;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Structured error types for the background removal service.
///
/// Each variant belongs to exactly one failure domain so the HTTP layer can map
/// it to a status code without inspecting messages. Detailed sources are kept
/// for server-side logging only.
#[derive(Error, Debug)]
pub enum BgRemovalError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Image exceeds configured limits")]
    ImageTooLarge {
        #[source]
        source: image::ImageError,
    },

    #[error("Image decode failed")]
    Decode {
        #[source]
        source: image::ImageError,
    },

    #[error("Image encode failed")]
    Encode {
        #[source]
        source: image::ImageError,
    },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Inference error: {operation} failed")]
    Inference {
        operation: String,
        #[source]
        source: BoxError,
    },

    #[error("Model download failed: {url}")]
    ModelDownload {
        url: String,
        #[source]
        source: BoxError,
    },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, BgRemovalError>;

impl BgRemovalError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn inference(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Inference {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Errors produced while loading the model. Used with `map_err`.
    pub fn model(operation: impl Into<String>) -> impl FnOnce(ort::Error) -> Self {
        let operation = operation.into();
        move |source| Self::Model {
            operation,
            source: Box::new(source),
        }
    }

    /// Splits a decoder failure into "over the limits" and "not an image".
    pub fn from_decode(source: image::ImageError) -> Self {
        match source {
            image::ImageError::Limits(_) => Self::ImageTooLarge { source },
            source => Self::Decode { source },
        }
    }
}

/// ONNX Runtime errors outside of model loading happen during a forward pass.
impl From<ort::Error> for BgRemovalError {
    fn from(err: ort::Error) -> Self {
        Self::inference("ort operation", err)
    }
}

/// Shape errors occur while reshaping model outputs, so they count as inference
/// failures rather than a separate tensor category.
impl From<ndarray::ShapeError> for BgRemovalError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::inference("tensor shape conversion", err)
    }
}
