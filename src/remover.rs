use std::io::Cursor;
use std::sync::Arc;

use image::{ImageFormat, ImageReader, Limits, RgbImage, RgbaImage};

use crate::device::Device;
use crate::errors::{BgRemovalError, Result};
use crate::traits::SegmentationModel;

/// Long-lived model host shared by every request handler.
///
/// Constructed once at startup around a loaded model; request handlers hold it
/// behind an `Arc` and never mutate it.
pub struct BackgroundRemover {
    model: Arc<dyn SegmentationModel>,
    max_dimension: u32,
}

impl BackgroundRemover {
    pub fn new(model: Arc<dyn SegmentationModel>, max_dimension: u32) -> Self {
        Self {
            model,
            max_dimension,
        }
    }

    pub fn device(&self) -> Device {
        self.model.device()
    }

    /// Decodes an upload into RGB, refusing images wider or taller than the limit.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| BgRemovalError::from_decode(image::ImageError::IoError(e)))?;

        let mut limits = Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        reader.limits(limits);

        let image = reader.decode().map_err(BgRemovalError::from_decode)?;
        Ok(image.into_rgb8())
    }

    pub fn segment(&self, image: &RgbImage) -> Result<RgbaImage> {
        self.model.segment(image)
    }

    /// Upload bytes in, PNG bytes with a transparent background out.
    pub fn remove_background(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        let image = self.decode(bytes)?;
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "decoded upload"
        );
        let output = self.segment(&image)?;
        encode_png(&output)
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|source| BgRemovalError::Encode { source })?;
    Ok(buffer.into_inner())
}
