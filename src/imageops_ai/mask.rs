use image::{GrayImage, ImageBuffer, Luma};

/// Logistic function mapping raw model scores to foreground probability.
pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Probability to 8-bit alpha. Clamped first since Lanczos resampling overshoots.
pub fn probability_to_alpha(p: f32) -> u8 {
    (p.clamp(0.0, 1.0) * 255.0).round() as u8
}

pub fn quantize(mask: &ImageBuffer<Luma<f32>, Vec<f32>>) -> GrayImage {
    let (width, height) = mask.dimensions();
    let pixels = mask
        .pixels()
        .map(|&Luma([p])| probability_to_alpha(p))
        .collect();
    // Same dimensions and one channel, so the buffer length always matches.
    GrayImage::from_raw(width, height, pixels).unwrap_or_else(|| GrayImage::new(width, height))
}
