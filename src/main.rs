mod config;
mod encoder;
mod error;
mod extract;
mod gemini;
mod history;
mod models;
mod pdf;
mod pipeline;
mod rate_limit;
mod render;
mod report;
mod resolver;
mod routes;
mod uploads;
#[cfg(test)]
mod test_support;

use anyhow::Context;
use routes::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::Config;
use crate::gemini::{mask_key, GeminiClient};
use crate::history::QueryStore;
use crate::pipeline::Pipeline;
use crate::rate_limit::RateLimiter;
use crate::resolver::HttpImageResolver;
use crate::uploads::{ImageStore, UploadResolver};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Init tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = Config::from_env();
    tracing::info!(
        "Using API key: {} (model {}, span mode {:?})",
        mask_key(&config.gemini_api_key),
        config.gemini_model,
        config.span_mode
    );

    let gemini = GeminiClient::new(&config).context("building Gemini HTTP client")?;
    if gemini.is_demo() {
        tracing::warn!("GEMINI_API_KEY not set, serving canned demo analyses");
    }

    let mut remote = HttpImageResolver::new(config.max_image_bytes).context("building image HTTP client")?;
    if config.allow_private_image_hosts {
        tracing::warn!("ALLOW_PRIVATE_IMAGE_HOSTS set, image URLs may target internal addresses");
        remote = remote.allow_private_hosts();
    }
    let uploads = ImageStore::new(config.max_image_bytes);
    let images = UploadResolver::new(uploads.clone(), &config.public_base_url, Arc::new(remote));
    let pipeline = Pipeline::new(Arc::new(images), Arc::new(gemini)).with_span_mode(config.span_mode);

    let state = AppState {
        store: QueryStore::default(),
        uploads,
        public_base_url: config.public_base_url.clone(),
        pipeline: Arc::new(pipeline),
        limiter: Arc::new(RateLimiter::new(config.rate_limit_max, config.rate_limit_window)),
    };
    let app = routes::app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "Starting server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
