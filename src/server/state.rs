use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::device::Device;
use crate::remover::BackgroundRemover;

/// Shared handler state: the model host plus the inference admission gate.
#[derive(Clone)]
pub struct AppState {
    pub remover: Arc<BackgroundRemover>,
    pub inference_permits: Arc<Semaphore>,
}

impl AppState {
    pub fn new(remover: BackgroundRemover, max_concurrent_inferences: usize) -> Self {
        Self {
            remover: Arc::new(remover),
            inference_permits: Arc::new(Semaphore::new(max_concurrent_inferences.max(1))),
        }
    }

    pub fn device(&self) -> Device {
        self.remover.device()
    }
}
