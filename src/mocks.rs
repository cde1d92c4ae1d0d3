use crate::device::Device;
use crate::errors::{BgRemovalError, Result};
use crate::traits::SegmentationModel;
use ndarray::prelude::*;

/// テスト用のモックセグメンテーションモデル
///
/// 正規化済み入力のチャンネル平均の2倍をロジットとして返す。
/// 明るい画素は不透明、暗い画素は透明になる
#[derive(Debug, Clone)]
pub struct MockSegmentationModel {
    pub image_size: u32,
    pub device: Device,
}

impl MockSegmentationModel {
    pub const fn new(image_size: u32) -> Self {
        Self {
            image_size,
            device: Device::Cpu,
        }
    }

    pub const fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }
}

impl SegmentationModel for MockSegmentationModel {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn device(&self) -> Device {
        self.device
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let mean = tensor.mean_axis(Axis(1)).ok_or_else(|| {
            BgRemovalError::inference("モック推論", "入力にチャンネルがありません")
        })?;
        Ok(mean.insert_axis(Axis(1)).mapv(|v| v * 2.0))
    }
}

/// 常に推論に失敗するモデル（エラー経路のテスト用）
#[derive(Debug, Clone, Default)]
pub struct FailingSegmentationModel;

impl SegmentationModel for FailingSegmentationModel {
    fn image_size(&self) -> u32 {
        16
    }

    fn device(&self) -> Device {
        Device::Cpu
    }

    fn predict(&self, _tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        Err(BgRemovalError::inference(
            "モック推論",
            "out of device memory",
        ))
    }
}
