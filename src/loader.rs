//! Model identifier resolution and download cache.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};

use crate::errors::{BgRemovalError, Result};

const HUB_BASE_URL: &str = "https://huggingface.co";

/// A file inside a Hugging Face model repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSource {
    pub repo: String,
    pub file: String,
}

impl ModelSource {
    pub fn new(repo: impl Into<String>, file: impl Into<String>) -> Self {
        Self {
            repo: repo.into(),
            file: file.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!(
            "{HUB_BASE_URL}/{}/resolve/main/{}",
            self.repo.trim_matches('/'),
            self.file.trim_start_matches('/')
        )
    }

    /// Location relative to the cache root, e.g.
    /// `onnx-community--BiRefNet-ONNX/onnx/model.onnx`.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        let mut path = PathBuf::from(self.repo.trim_matches('/').replace('/', "--"));
        path.extend(self.file.split('/').filter(|part| !part.is_empty()));
        path
    }
}

/// Manages the model cache directory and downloads.
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Uses `cache_dir` when given, otherwise the platform cache directory:
    /// - Linux: `~/.cache/birefnet-server/models`
    /// - macOS: `~/Library/Caches/birefnet-server/models`
    /// - Windows: `%LOCALAPPDATA%\birefnet-server\models`
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("birefnet-server")
                .join("models")
        });

        fs::create_dir_all(&cache_dir).map_err(|source| BgRemovalError::FileSystem {
            path: cache_dir.clone(),
            operation: "create cache directory".to_string(),
            source,
        })?;

        Ok(Self { cache_dir })
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Local path of `source`, downloading it first if it is not cached yet.
    pub fn resolve(&self, source: &ModelSource) -> Result<PathBuf> {
        let path = self.cache_dir.join(source.cache_path());
        if path.is_file() {
            tracing::debug!(path = %path.display(), "using cached model");
            return Ok(path);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| BgRemovalError::FileSystem {
                path: parent.to_path_buf(),
                operation: "create model directory".to_string(),
                source,
            })?;
        }

        download_file(&source.url(), &path)?;
        Ok(path)
    }
}

/// Download a file from a URL to a path with progress indication.
fn download_file(url: &str, path: &Path) -> Result<()> {
    tracing::info!("Downloading model from {url}");
    let download_error = |source: reqwest::Error| BgRemovalError::ModelDownload {
        url: url.to_string(),
        source: Box::new(source),
    };

    let mut response = reqwest::blocking::Client::new()
        .get(url)
        .send()
        .and_then(reqwest::blocking::Response::error_for_status)
        .map_err(download_error)?;

    let pb = match response.content_length() {
        Some(total) => ProgressBar::new(total),
        None => ProgressBar::new_spinner(),
    };
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }

    // Write to a temporary file first, then rename so a partial download is never picked up.
    let temp_path = path.with_extension("part");
    let write_error = |source| BgRemovalError::FileSystem {
        path: temp_path.clone(),
        operation: "write model download".to_string(),
        source,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_error)?;

    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let bytes_read =
            response
                .read(&mut buffer)
                .map_err(|source| BgRemovalError::ModelDownload {
                    url: url.to_string(),
                    source: Box::new(source),
                })?;
        if bytes_read == 0 {
            break;
        }
        file.write_all(&buffer[..bytes_read]).map_err(write_error)?;
        pb.inc(bytes_read as u64);
    }
    file.flush().map_err(write_error)?;
    pb.finish_and_clear();

    fs::rename(&temp_path, path).map_err(|source| BgRemovalError::FileSystem {
        path: path.to_path_buf(),
        operation: "move model download into cache".to_string(),
        source,
    })?;
    tracing::info!(path = %path.display(), "model downloaded");

    Ok(())
}
