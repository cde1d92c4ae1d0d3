//! HTTP endpoint layer.

pub mod error;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Request, Response},
    routing::{get, post},
    Router,
};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::{Config, DEFAULT_ALLOWED_ORIGINS};
use crate::errors::{BgRemovalError, Result};

pub use error::ApiError;
pub use handlers::PROCESSING_TIME_HEADER;
pub use state::AppState;

/// Transport-level settings for the router.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub allowed_origins: Vec<HeaderValue>,
    pub max_upload_bytes: usize,
}

impl ServerOptions {
    pub fn new<S: AsRef<str>>(allowed_origins: &[S], max_upload_bytes: usize) -> Result<Self> {
        let allowed_origins = allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin.as_ref()).map_err(|_| {
                    BgRemovalError::configuration(format!(
                        "invalid allowed origin: {}",
                        origin.as_ref()
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            allowed_origins,
            max_upload_bytes,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.allowed_origins, config.max_upload_bytes)
    }
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS
                .into_iter()
                .map(HeaderValue::from_static)
                .collect(),
            max_upload_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Cross-origin policy: fixed origin allow-list, any method and header from
/// those origins, credentials allowed, timing header readable by the client.
pub fn cors_layer(options: &ServerOptions) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(options.allowed_origins.clone()))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
        .expose_headers([PROCESSING_TIME_HEADER])
}

pub fn router(state: AppState, options: &ServerOptions) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request<Body>| {
            tracing::info_span!(
                "request",
                method = %req.method(),
                uri = %req.uri(),
                version = ?req.version(),
            )
        })
        .on_response(|res: &Response<Body>, latency: Duration, _span: &tracing::Span| {
            info!(
                latency = %format!("{} ms", latency.as_millis()),
                status = %res.status().as_u16(),
                "finished processing request"
            );
        });

    Router::new()
        .route("/remove-bg", post(handlers::remove_background))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(options.max_upload_bytes))
        .layer(trace_layer)
        .layer(cors_layer(options))
        .with_state(state)
}

/// Serves `router` until Ctrl-C.
pub async fn serve(addr: &str, app: Router) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting server on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}
