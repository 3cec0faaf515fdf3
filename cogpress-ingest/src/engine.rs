//! Conversion decision engine
//!
//! Decides whether a source raster can be published as-is or must be routed
//! through the transcoder, re-validates transcoded output, and commits the
//! result. Commit order is upload first, local promotion second, so a failed
//! upload never leaves an artifact under a final staging name and the output
//! store never observes anything the oracle has not passed.
//!
//! Every working file is held by a [`WorkingArtifact`] guard; whichever way a
//! request leaves this module, the guard removes the file unless it was
//! promoted.

use crate::inspect::{GdalInfoInspector, RasterInspector};
use crate::storage::{ArtifactSink, BlobLocation, BlobStore, SourceStore};
use crate::transcode::{GdalTranslate, TranscodeError, Transcoder};
use crate::validate::{CogValidatorCli, ComplianceOracle};
use cogpress_common::{EncodingProfile, ServiceConfig};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// Terminal failure of one processing request.
///
/// None of these are retried; the façade maps each to a transport response.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Source raster unreadable or unopenable
    #[error("failed to open source raster: {0}")]
    Open(String),

    /// The compliance oracle itself could not run
    #[error("compliance check could not run: {0}")]
    ComplianceCheck(String),

    /// External transcoder failed or timed out
    #[error("conversion failed: {0}")]
    Transcode(#[from] TranscodeError),

    /// Transcoded output failed re-validation; it was discarded, not published
    #[error("conversion failed, the converted file still has issues: {}", .errors.join("; "))]
    StillNonCompliant { errors: Vec<String> },

    /// Publishing to the output store failed
    #[error("upload failed: {0}")]
    Upload(String),

    /// Local staging filesystem error
    #[error("staging error: {0}")]
    Staging(#[from] std::io::Error),
}

/// A finalized, published artifact
#[derive(Debug, Clone)]
pub struct PublishedArtifact {
    /// Local staging copy of the published bytes
    pub local_path: PathBuf,
    /// Key the artifact was published under
    pub publish_key: String,
    /// Where the artifact now lives
    pub output_location: String,
    /// Whether the transcoder ran, or the source passed through byte-for-byte
    pub converted: bool,
    /// Warnings from the last oracle run against the published bytes
    pub warnings: Vec<String>,
}

/// Engine settings fixed at construction
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub staging_dir: PathBuf,
    pub target_epsg: u32,
    pub encoding: EncodingProfile,
}

impl From<&ServiceConfig> for EngineSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            staging_dir: config.staging_dir.clone(),
            target_epsg: config.target_epsg,
            encoding: config.encoding.clone(),
        }
    }
}

/// Transient transcoder output, deleted on drop unless promoted.
///
/// Names embed a fresh UUID, so concurrent requests in the shared staging
/// directory can never allocate the same path and the path never pre-exists.
struct WorkingArtifact {
    path: PathBuf,
    armed: bool,
}

impl WorkingArtifact {
    fn allocate(staging_dir: &Path) -> Self {
        Self {
            path: staging_dir.join(format!("work-{}.tif", Uuid::new_v4())),
            armed: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// Atomically move the working file to its final name. The rename stays
    /// within the staging directory, so a concurrent reader sees either
    /// nothing or the complete file, never partial bytes.
    async fn promote(mut self, dest: &Path) -> std::io::Result<PathBuf> {
        tokio::fs::rename(&self.path, dest).await?;
        self.armed = false;
        Ok(dest.to_path_buf())
    }
}

impl Drop for WorkingArtifact {
    fn drop(&mut self) {
        if self.armed {
            // Removal is best-effort; the file may never have been created.
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// The validate-then-convert pipeline for one deployment
pub struct ConversionEngine {
    inspector: Arc<dyn RasterInspector>,
    oracle: Arc<dyn ComplianceOracle>,
    transcoder: Arc<dyn Transcoder>,
    input: Arc<dyn SourceStore>,
    output: Arc<dyn ArtifactSink>,
    settings: EngineSettings,
}

impl ConversionEngine {
    pub fn new(
        inspector: Arc<dyn RasterInspector>,
        oracle: Arc<dyn ComplianceOracle>,
        transcoder: Arc<dyn Transcoder>,
        input: Arc<dyn SourceStore>,
        output: Arc<dyn ArtifactSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            inspector,
            oracle,
            transcoder,
            input,
            output,
            settings,
        }
    }

    /// Wire up the production collaborators from service configuration.
    pub fn from_config(config: &ServiceConfig) -> cogpress_common::Result<Self> {
        let input = BlobStore::open(BlobLocation::parse(&config.input_location))?;
        let output = BlobStore::open(BlobLocation::parse(&config.output_location))?;
        Ok(Self::new(
            Arc::new(GdalInfoInspector::new(&config.gdalinfo_bin)),
            Arc::new(CogValidatorCli::new(&config.validator_bin)),
            Arc::new(GdalTranslate::new(
                &config.gdal_translate_bin,
                Duration::from_secs(config.transcode_timeout_secs),
            )),
            Arc::new(input),
            Arc::new(output),
            EngineSettings::from(config),
        ))
    }

    /// Process one source raster end to end.
    ///
    /// A source that is already a compliant COG in the target reference is
    /// staged byte-for-byte without touching the transcoder. Everything else
    /// is transcoded with the fixed profile and re-validated before it may be
    /// published.
    pub async fn process(&self, key: &str) -> Result<PublishedArtifact, ProcessError> {
        let source_path = self.input.gdal_read_path(key);

        let raster = self
            .inspector
            .inspect(&source_path)
            .await
            .map_err(|e| ProcessError::Open(e.to_string()))?;

        let report = self
            .oracle
            .validate(&source_path)
            .await
            .map_err(|e| ProcessError::ComplianceCheck(e.to_string()))?;

        let reference_match = raster.epsg == Some(self.settings.target_epsg);
        if !reference_match {
            warn!(
                key,
                epsg = ?raster.epsg,
                target_epsg = self.settings.target_epsg,
                "Source is not in the target reference system"
            );
        }

        let publish_key = base_name(key).to_string();
        let working = WorkingArtifact::allocate(&self.settings.staging_dir);

        let (converted, warnings) = if report.is_compliant() && reference_match {
            info!(key, "Source is already a valid COG in the target reference");
            self.input
                .fetch_to(key, working.path())
                .await
                .map_err(|e| ProcessError::Open(format!("failed to stage source bytes: {}", e)))?;
            (false, report.warnings)
        } else {
            info!(
                key,
                compliant = report.is_compliant(),
                reference_match,
                "Converting source to COG"
            );
            self.transcoder
                .transcode(&source_path, working.path(), &self.settings.encoding)
                .await?;

            let revalidated = self
                .oracle
                .validate(&working.path().display().to_string())
                .await
                .map_err(|e| ProcessError::ComplianceCheck(e.to_string()))?;
            if !revalidated.is_compliant() {
                warn!(key, errors = ?revalidated.errors, "Converted file failed re-validation");
                return Err(ProcessError::StillNonCompliant {
                    errors: revalidated.errors,
                });
            }
            (true, revalidated.warnings)
        };

        // Commit: bytes reach the output store before anything appears under
        // the final staging name.
        self.output
            .put(working.path(), &publish_key)
            .await
            .map_err(|e| ProcessError::Upload(e.to_string()))?;

        let final_path = self.settings.staging_dir.join(&publish_key);
        let local_path = working.promote(&final_path).await?;

        let output_location = self.output.public_url(&publish_key);
        info!(key, publish_key = %publish_key, %output_location, converted, "Artifact published");

        Ok(PublishedArtifact {
            local_path,
            publish_key,
            output_location,
            converted,
            warnings,
        })
    }
}

/// Final path segment of an object key.
fn base_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}
