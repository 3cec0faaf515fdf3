//! Raster processing endpoint
//!
//! POST /process accepts an object key within the configured input location,
//! runs the conversion engine, and reports where the artifact was published.
//! Failures map to non-2xx responses; see [`crate::error::ApiError`].

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// POST /process request
#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub file_name: Option<String>,
}

/// POST /process response
#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub message: String,
    pub publish_key: String,
    pub output_location: String,
    pub converted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// POST /process
///
/// Validate the named source raster and publish it as a COG, converting
/// first if needed.
pub async fn process_raster(
    State(state): State<AppState>,
    Json(request): Json<ProcessRequest>,
) -> ApiResult<Json<ProcessResponse>> {
    let file_name = request
        .file_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .ok_or_else(|| ApiError::BadRequest("file_name is required".to_string()))?
        .to_string();

    info!(file_name = %file_name, "Processing request received");

    let artifact = state.engine.process(&file_name).await?;

    let message = if artifact.converted {
        format!(
            "File converted to COG and published to {}",
            artifact.output_location
        )
    } else {
        format!(
            "File is already a valid COG, published to {}",
            artifact.output_location
        )
    };

    Ok(Json(ProcessResponse {
        message,
        publish_key: artifact.publish_key,
        output_location: artifact.output_location,
        converted: artifact.converted,
        warnings: artifact.warnings,
    }))
}

/// Build processing routes
pub fn process_routes() -> Router<AppState> {
    Router::new().route("/process", post(process_raster))
}
