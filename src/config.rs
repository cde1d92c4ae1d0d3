use clap::Parser;
use std::path::PathBuf;

use crate::device::DevicePreference;
use crate::errors::{BgRemovalError, Result};

pub const DEFAULT_MODEL_REPO: &str = "onnx-community/BiRefNet-ONNX";
pub const DEFAULT_MODEL_FILE: &str = "onnx/model.onnx";
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] = ["http://localhost:3000", "http://127.0.0.1:3000"];

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(long, default_value = "0.0.0.0")]
    pub host: String,

    #[arg(short, long, default_value_t = 8000)]
    pub port: u16,

    /// Hugging Face repository holding the ONNX export
    #[arg(long, default_value = DEFAULT_MODEL_REPO)]
    pub model_repo: String,

    /// Path of the ONNX file inside the repository
    #[arg(long, default_value = DEFAULT_MODEL_FILE)]
    pub model_file: String,

    /// Local ONNX file; skips the download when set
    #[arg(short, long)]
    pub model_path: Option<PathBuf>,

    /// Download cache, defaults to the platform cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value_t = DevicePreference::Auto)]
    pub device: DevicePreference,

    /// Intra-op threads for ONNX Runtime
    #[arg(long)]
    pub num_threads: Option<usize>,

    #[arg(long, default_value_t = 1)]
    pub max_concurrent_inferences: usize,

    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    /// Largest accepted width or height of a decoded upload
    #[arg(long, default_value_t = 8192)]
    pub max_image_dimension: u32,

    /// Cross-origin allow-list, repeat for several origins
    #[arg(long = "allowed-origin", default_values_t = DEFAULT_ALLOWED_ORIGINS.map(String::from))]
    pub allowed_origins: Vec<String>,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(BgRemovalError::configuration("port must be non-zero"));
        }
        if self.max_concurrent_inferences == 0 {
            return Err(BgRemovalError::configuration(
                "max-concurrent-inferences must be at least 1",
            ));
        }
        if self.max_upload_bytes == 0 {
            return Err(BgRemovalError::configuration(
                "max-upload-bytes must be non-zero",
            ));
        }
        if self.max_image_dimension == 0 {
            return Err(BgRemovalError::configuration(
                "max-image-dimension must be non-zero",
            ));
        }
        if self.num_threads == Some(0) {
            return Err(BgRemovalError::configuration(
                "num-threads must be at least 1",
            ));
        }
        if let Some(path) = &self.model_path {
            if !path.exists() {
                return Err(BgRemovalError::configuration(format!(
                    "model path does not exist: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
