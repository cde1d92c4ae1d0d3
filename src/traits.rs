use crate::device::Device;
use crate::errors::Result;
use image::{RgbImage, RgbaImage};
use ndarray::prelude::*;

/// 画像セグメンテーションモデルの抽象化
///
/// HTTP層はこのtraitのみに依存し、テストではONNXセッションをモックに差し替える
pub trait SegmentationModel: Send + Sync {
    /// モデルの入力画像サイズを取得
    fn image_size(&self) -> u32;

    /// ロード時に選択されたデバイス
    fn device(&self) -> Device;

    /// テンソル予測（低レベルAPI）: 正規化済み `(1, 3, S, S)` → ロジット `(1, 1, S, S)`
    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// 画像のセグメンテーション処理を実行。予測マスクをアルファチャンネルとして付与する
    fn segment(&self, image: &RgbImage) -> Result<RgbaImage> {
        crate::model::segment_image(self, image)
    }
}
