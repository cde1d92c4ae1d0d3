use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use birefnet_server::server::{self, AppState, ServerOptions};
use birefnet_server::{BackgroundRemover, Config, Model};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .compact()
        .init();

    let config = Config::parse();
    config.validate()?;
    let options = ServerOptions::from_config(&config)?;

    // Model resolution downloads over blocking HTTP, keep it off the async workers.
    let model = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || Model::load(&config))
            .await
            .context("model loading task panicked")?
            .context("failed to load segmentation model")?
    };

    let remover = BackgroundRemover::new(Arc::new(model), config.max_image_dimension);
    let state = AppState::new(remover, config.max_concurrent_inferences);
    let app = server::router(state, &options);

    server::serve(&config.bind_address(), app).await
}
