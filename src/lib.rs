pub mod config;
pub mod device;
pub mod errors;
pub mod imageops_ai;
pub mod loader;
pub mod model;
pub mod remover;
pub mod server;
pub mod traits;

pub mod mocks;

pub use config::Config;
pub use device::Device;
pub use errors::{BgRemovalError, Result};
pub use model::{Model, MODEL_NAME};
pub use remover::BackgroundRemover;
pub use traits::*;
