use std::path::Path;

use crate::{
    config::Config,
    device::{provider_available, select_device, Device},
    errors::{BgRemovalError, Result},
    imageops_ai::{
        mask::{quantize, sigmoid},
        AlphaMaskApplicable,
    },
    loader::{ModelCache, ModelSource},
    traits::SegmentationModel,
};
use image::{imageops, imageops::FilterType, GrayImage, ImageBuffer, Luma, RgbImage, RgbaImage};
use ndarray::prelude::*;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use tracing::{debug_span, info};

pub const MODEL_NAME: &str = "BiRefNet (SOTA 2024)";

/// Working resolution used when the graph declares a dynamic input size.
pub const DEFAULT_IMAGE_SIZE: u32 = 1024;

/// ImageNet channel statistics the network was trained with.
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// BiRefNet running in an ONNX Runtime session.
///
/// `Session::run` needs exclusive access, so concurrent requests serialise on
/// the mutex; the HTTP layer additionally bounds how many wait here.
pub struct Model {
    pub image_size: u32,
    device: Device,
    input_name: String,
    output_name: String,
    session: Mutex<Session>,
}

impl Model {
    /// Resolves the model named in `config`, picks a device and builds the session.
    pub fn load(config: &Config) -> Result<Self> {
        info!("Loading BiRefNet model (state-of-the-art 2024)...");
        let device = select_device(config.device, provider_available)?;
        info!("Using device: {device}");

        let model_path = match &config.model_path {
            Some(path) => path.clone(),
            None => ModelCache::new(config.cache_dir.clone())?
                .resolve(&ModelSource::new(&config.model_repo, &config.model_file))?,
        };

        let model = Self::new(&model_path, device, config.num_threads)?;
        info!(image_size = model.image_size, "BiRefNet loaded successfully!");
        Ok(model)
    }

    pub fn new(model_path: &Path, device: Device, num_threads: Option<usize>) -> Result<Self> {
        let mut builder = Session::builder()
            .map_err(BgRemovalError::model("セッションビルダー初期化"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(BgRemovalError::model("最適化レベル設定"))?
            .with_execution_providers(device.execution_providers())
            .map_err(BgRemovalError::model(format!("実行プロバイダー設定: {device}")))?
            .with_memory_pattern(true)
            .map_err(BgRemovalError::model("メモリパターン設定"))?;
        if let Some(threads) = num_threads {
            builder = builder
                .with_intra_threads(threads)
                .map_err(BgRemovalError::model("スレッド数設定"))?;
        }
        let mut session = builder
            .commit_from_file(model_path)
            .map_err(BgRemovalError::model(format!(
                "モデルファイル読み込み: {}",
                model_path.display()
            )))?;

        let input = session.inputs.first().ok_or_else(|| BgRemovalError::Model {
            operation: "モデル入力取得".to_string(),
            source: "モデルに入力がありません".into(),
        })?;
        let image_size = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.get(2).copied())
            .filter(|&dim| dim > 0)
            .map_or(DEFAULT_IMAGE_SIZE, |dim| dim as u32);
        let input_name = input.name.clone();

        // 各リファインメント段階のマップが出力される。最後が最終予測
        let output_name = session
            .outputs
            .last()
            .map(|output| output.name.clone())
            .ok_or_else(|| BgRemovalError::Model {
                operation: "モデル出力取得".to_string(),
                source: "モデルに出力がありません".into(),
            })?;

        // ウォームアップ
        let data = Array4::<f32>::zeros((1, 3, image_size as usize, image_size as usize));
        session
            .run(ort::inputs![
                input_name.as_str() => TensorRef::from_array_view(&data)
                    .map_err(BgRemovalError::model("初期化テンソル作成"))?
            ])
            .map_err(BgRemovalError::model("モデル初期化実行"))?;

        Ok(Self {
            image_size,
            device,
            input_name,
            output_name,
            session: Mutex::new(session),
        })
    }
}

impl SegmentationModel for Model {
    fn image_size(&self) -> u32 {
        self.image_size
    }

    fn device(&self) -> Device {
        self.device
    }

    fn predict(&self, tensor: ArrayView4<f32>) -> Result<Array4<f32>> {
        let _span = debug_span!("inference").entered();
        let mut binding = self.session.lock();
        let outputs = binding.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(&tensor.as_standard_layout())?
        ])?;
        let logits = outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix4>()?
            .to_owned();
        Ok(logits)
    }
}

/// Resize → normalize → forward pass → sigmoid → resize mask back → install as alpha.
///
/// The output always has the same dimensions as `image`.
pub fn segment_image<M>(model: &M, image: &RgbImage) -> Result<RgbaImage>
where
    M: SegmentationModel + ?Sized,
{
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(BgRemovalError::invalid_input("画像にピクセルがありません"));
    }

    let tensor = preprocess(image, model.image_size());
    let logits = model.predict(tensor.view())?;
    let mask = postprocess_mask(logits.view(), width, height)?;

    let _span = debug_span!("composite").entered();
    image.apply_alpha_mask(&mask)
}

/// Bilinear resize to the working resolution, then per-channel ImageNet
/// normalization into an NCHW tensor with batch size 1.
pub fn preprocess(image: &RgbImage, image_size: u32) -> Array4<f32> {
    let _span = debug_span!("preprocess").entered();
    let image = imageops::resize(image, image_size, image_size, FilterType::Triangle);
    let size = image_size as usize;

    Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        let value = f32::from(image.get_pixel(x as u32, y as u32)[c]) / 255.0;
        (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c]
    })
}

/// Turns `(N, C, H, W)` logits into an 8-bit alpha mask of `width`×`height`,
/// using the first batch item and channel.
pub fn postprocess_mask(logits: ArrayView4<f32>, width: u32, height: u32) -> Result<GrayImage> {
    let _span = debug_span!("postprocess").entered();
    let (batch, channels, mask_height, mask_width) = logits.dim();
    if batch == 0 || channels == 0 || mask_height == 0 || mask_width == 0 {
        return Err(BgRemovalError::inference(
            "モデル出力読み取り",
            format!("想定外の出力形状: {:?}", logits.shape()),
        ));
    }

    let probabilities: Vec<f32> = logits
        .slice(s![0, 0, .., ..])
        .iter()
        .map(|&v| sigmoid(v))
        .collect();
    let mask: ImageBuffer<Luma<f32>, Vec<f32>> =
        ImageBuffer::from_raw(mask_width as u32, mask_height as u32, probabilities).ok_or_else(
            || {
                BgRemovalError::inference(
                    "モデル出力読み取り",
                    "マスクバッファが出力形状と一致しません",
                )
            },
        )?;

    let mask = imageops::resize(&mask, width, height, FilterType::Lanczos3);
    Ok(quantize(&mask))
}
