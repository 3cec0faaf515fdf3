//! cogpress-ingest - Raster Ingest Microservice
//!
//! Accepts an object key for a source TIFF, checks whether it is already a
//! valid Cloud-Optimized GeoTIFF in the target spatial reference, converts
//! it if not, and publishes the result to the output blob store.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cogpress_common::ServiceConfig;
use cogpress_ingest::engine::ConversionEngine;
use cogpress_ingest::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting cogpress-ingest (Raster Ingest) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = ServiceConfig::resolve();
    info!("Input location: {}", config.input_location);
    info!("Output location: {}", config.output_location);
    info!("Target reference: EPSG:{}", config.target_epsg);

    config
        .ensure_staging_dir()
        .map_err(|e| anyhow::anyhow!("Failed to initialize staging directory: {}", e))?;
    info!("Staging directory: {}", config.staging_dir.display());

    let engine = ConversionEngine::from_config(&config)
        .map_err(|e| anyhow::anyhow!("Failed to initialize conversion engine: {}", e))?;
    let state = AppState::new(Arc::new(engine));

    let app = cogpress_ingest::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!("Listening on http://{}", config.bind_address);
    info!("Health check: http://{}/health", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
