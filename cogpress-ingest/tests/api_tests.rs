//! Integration tests for the HTTP façade
//!
//! Router-level tests using tower's oneshot: request validation, the success
//! envelope, and the mapping of engine failures to non-2xx responses.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use cogpress_common::EncodingProfile;
use cogpress_ingest::engine::{ConversionEngine, EngineSettings};
use cogpress_ingest::inspect::{InspectError, RasterInfo, RasterInspector};
use cogpress_ingest::storage::{BlobLocation, BlobStore};
use cogpress_ingest::transcode::{TranscodeError, Transcoder};
use cogpress_ingest::validate::{ComplianceCheckError, ComplianceOracle, ComplianceReport};
use cogpress_ingest::{build_router, AppState};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct FixedInspector {
    epsg: Option<u32>,
    fail: bool,
}

#[async_trait]
impl RasterInspector for FixedInspector {
    async fn inspect(&self, path: &str) -> Result<RasterInfo, InspectError> {
        if self.fail {
            return Err(InspectError {
                path: path.to_string(),
                detail: "not recognized as being in a supported file format".to_string(),
            });
        }
        Ok(RasterInfo { epsg: self.epsg })
    }
}

struct AlwaysCompliant;

#[async_trait]
impl ComplianceOracle for AlwaysCompliant {
    async fn validate(&self, _path: &str) -> Result<ComplianceReport, ComplianceCheckError> {
        Ok(ComplianceReport::default())
    }
}

struct NoopTranscoder;

#[async_trait]
impl Transcoder for NoopTranscoder {
    async fn transcode(
        &self,
        _src: &str,
        dst: &Path,
        _profile: &EncodingProfile,
    ) -> Result<(), TranscodeError> {
        tokio::fs::write(dst, b"converted")
            .await
            .map_err(TranscodeError::Spawn)?;
        Ok(())
    }
}

/// Router wired to an engine over tempdir-backed locations.
fn test_app(inspector: FixedInspector, root: &TempDir) -> axum::Router {
    let input_dir = root.path().join("input");
    let output_dir = root.path().join("output");
    let staging_dir = root.path().join("staging");
    std::fs::create_dir_all(&input_dir).unwrap();
    std::fs::create_dir_all(&staging_dir).unwrap();
    std::fs::write(input_dir.join("scene.tif"), b"cog bytes").unwrap();

    let engine = ConversionEngine::new(
        Arc::new(inspector),
        Arc::new(AlwaysCompliant),
        Arc::new(NoopTranscoder),
        Arc::new(BlobStore::open(BlobLocation::Local { dir: input_dir }).unwrap()),
        Arc::new(BlobStore::open(BlobLocation::Local { dir: output_dir }).unwrap()),
        EngineSettings {
            staging_dir,
            target_epsg: 4326,
            encoding: EncodingProfile::default(),
        },
    );
    build_router(AppState::new(Arc::new(engine)))
}

fn process_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/process")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn response_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn missing_file_name_is_rejected_with_400() {
    let root = TempDir::new().unwrap();
    let app = test_app(
        FixedInspector {
            epsg: Some(4326),
            fail: false,
        },
        &root,
    );

    let response = app.oneshot(process_request(json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("file_name is required"));
}

#[tokio::test]
async fn blank_file_name_is_rejected_with_400() {
    let root = TempDir::new().unwrap();
    let app = test_app(
        FixedInspector {
            epsg: Some(4326),
            fail: false,
        },
        &root,
    );

    let response = app
        .oneshot(process_request(json!({ "file_name": "   " })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn compliant_source_returns_success_envelope() {
    let root = TempDir::new().unwrap();
    let app = test_app(
        FixedInspector {
            epsg: Some(4326),
            fail: false,
        },
        &root,
    );

    let response = app
        .oneshot(process_request(json!({ "file_name": "scene.tif" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["publish_key"], "scene.tif");
    assert_eq!(body["converted"], false);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("already a valid COG"));
    assert!(body["output_location"]
        .as_str()
        .unwrap()
        .ends_with("scene.tif"));
}

#[tokio::test]
async fn converted_source_reports_conversion() {
    let root = TempDir::new().unwrap();
    // Wrong reference forces the convert path
    let app = test_app(
        FixedInspector {
            epsg: Some(32644),
            fail: false,
        },
        &root,
    );

    let response = app
        .oneshot(process_request(json!({ "file_name": "scene.tif" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["converted"], true);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("converted to COG"));
}

#[tokio::test]
async fn unopenable_source_maps_to_422() {
    let root = TempDir::new().unwrap();
    let app = test_app(
        FixedInspector {
            epsg: None,
            fail: true,
        },
        &root,
    );

    let response = app
        .oneshot(process_request(json!({ "file_name": "corrupt.tif" })))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = response_json(response).await;
    assert_eq!(body["error"]["code"], "UNPROCESSABLE");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("failed to open source raster"));
}

#[tokio::test]
async fn health_endpoint_reports_module_and_version() {
    let root = TempDir::new().unwrap();
    let app = test_app(
        FixedInspector {
            epsg: Some(4326),
            fail: false,
        },
        &root,
    );

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "cogpress-ingest");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}
