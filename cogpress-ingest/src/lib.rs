//! cogpress-ingest library interface
//!
//! Exposes the conversion engine and router for integration testing.

pub mod api;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod storage;
pub mod transcode;
pub mod validate;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use engine::ConversionEngine;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Conversion decision engine
    pub engine: Arc<ConversionEngine>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Arc<ConversionEngine>) -> Self {
        Self {
            engine,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::process_routes())
        .merge(api::health_routes())
        .with_state(state)
}
