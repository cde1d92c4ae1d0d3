use image::{ImageBuffer, Luma, Pixel, Primitive, Rgb, Rgba};
use num_traits::AsPrimitive;

use crate::errors::{BgRemovalError, Result};
use crate::imageops_ai::{get_max_value, is_floating_point};

/// Installs a single-channel mask as the alpha channel of an RGB image.
pub trait AlphaMaskApplicable<SI>
where
    SI: Primitive + AsPrimitive<f32> + 'static,
{
    fn apply_alpha_mask<SM>(
        &self,
        mask: &ImageBuffer<Luma<SM>, Vec<SM>>,
    ) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
    where
        Rgba<SI>: Pixel<Subpixel = SI>,
        SM: Primitive + AsPrimitive<f32> + 'static,
        f32: AsPrimitive<SM>;
}

impl<SI> AlphaMaskApplicable<SI> for ImageBuffer<Rgb<SI>, Vec<SI>>
where
    Rgb<SI>: Pixel<Subpixel = SI>,
    SI: Primitive + AsPrimitive<f32> + 'static,
    f32: AsPrimitive<SI>,
{
    fn apply_alpha_mask<SM>(
        &self,
        mask: &ImageBuffer<Luma<SM>, Vec<SM>>,
    ) -> Result<ImageBuffer<Rgba<SI>, Vec<SI>>>
    where
        Rgba<SI>: Pixel<Subpixel = SI>,
        SM: Primitive + AsPrimitive<f32> + 'static,
        f32: AsPrimitive<SM>,
    {
        if self.dimensions() != mask.dimensions() {
            let (iw, ih) = self.dimensions();
            let (mw, mh) = mask.dimensions();
            return Err(BgRemovalError::ImageProcessing {
                operation: "マスク適用".to_string(),
                source: format!(
                    "画像とマスクのサイズが一致しません: 画像{iw}x{ih}, マスク{mw}x{mh}"
                )
                .into(),
            });
        }

        let si_max = get_max_value::<SI>().as_();
        let sm_max = get_max_value::<SM>().as_();
        let integral = !is_floating_point::<SI>();

        let processed_pixels = self
            .pixels()
            .zip(mask.pixels())
            .flat_map(|(&image_pixel, &mask_pixel)| {
                let Rgb([red, green, blue]) = image_pixel;
                let Luma([alpha]) = mask_pixel;
                let alpha = alpha.as_() / sm_max * si_max;
                let alpha = if integral { alpha.round() } else { alpha };
                [red, green, blue, alpha.as_()]
            })
            .collect::<Vec<SI>>();

        ImageBuffer::from_raw(self.width(), self.height(), processed_pixels).ok_or_else(|| {
            BgRemovalError::ImageProcessing {
                operation: "マスク適用".to_string(),
                source: "ピクセルバッファが画像サイズと一致しません".into(),
            }
        })
    }
}
