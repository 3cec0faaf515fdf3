//! COG compliance validation
//!
//! Wraps GDAL's `validate_cloud_optimized_geotiff.py` checker as an oracle
//! returning structured warnings and errors. "The oracle could not run" is a
//! distinct failure from "the oracle ran and found errors"; only the latter
//! is expressed through [`ComplianceReport`].

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Result of one validator run against one raster.
///
/// A fresh report is produced every time the oracle runs; reports are never
/// reused across files or across conversion attempts.
#[derive(Debug, Clone, Default)]
pub struct ComplianceReport {
    /// Non-fatal layout findings
    pub warnings: Vec<String>,
    /// Structural violations; non-empty means not a valid COG
    pub errors: Vec<String>,
}

impl ComplianceReport {
    pub fn is_compliant(&self) -> bool {
        self.errors.is_empty()
    }
}

/// The validator itself failed to run
#[derive(Debug, Error)]
#[error("compliance validator could not run: {0}")]
pub struct ComplianceCheckError(pub String);

/// Capability interface for COG structural validation
#[async_trait]
pub trait ComplianceOracle: Send + Sync {
    async fn validate(&self, path: &str) -> Result<ComplianceReport, ComplianceCheckError>;
}

/// Production oracle invoking the GDAL COG validator script.
///
/// Structural check only; the validator's full pixel-consistency mode is
/// deliberately not requested.
pub struct CogValidatorCli {
    bin: String,
}

impl CogValidatorCli {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl ComplianceOracle for CogValidatorCli {
    async fn validate(&self, path: &str) -> Result<ComplianceReport, ComplianceCheckError> {
        debug!(command = %self.bin, path, "Running COG validator");

        let output = Command::new(&self.bin)
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| ComplianceCheckError(format!("failed to run {}: {}", self.bin, e)))?;

        // The validator exits 0 for a valid COG and 1 for an invalid one.
        // Anything else means it did not get as far as a verdict.
        match output.status.code() {
            Some(0) | Some(1) => {}
            other => {
                return Err(ComplianceCheckError(format!(
                    "{} exited with {:?}: {}",
                    self.bin,
                    other,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut report = parse_validator_output(&stdout);

        // Invalid verdict with nothing parseable: keep the raw output so the
        // caller still sees why.
        if output.status.code() == Some(1) && report.errors.is_empty() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stdout.trim().is_empty() {
                stderr.trim().to_string()
            } else {
                stdout.trim().to_string()
            };
            report.errors.push(detail);
        }

        Ok(report)
    }
}

/// Parse the validator's sectioned plain-text output.
///
/// ```text
/// x.tif is NOT a valid cloud optimized GeoTIFF.
/// The following errors were found:
///  - The file is greater than 512xH or Wx512, but is not tiled
///
/// The following warnings were found:
///  - The file has no internal overviews
/// ```
fn parse_validator_output(stdout: &str) -> ComplianceReport {
    enum Section {
        None,
        Errors,
        Warnings,
    }

    let mut report = ComplianceReport::default();
    let mut section = Section::None;

    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.ends_with("errors were found:") {
            section = Section::Errors;
        } else if trimmed.ends_with("warnings were found:") {
            section = Section::Warnings;
        } else if let Some(item) = trimmed.strip_prefix("- ") {
            match section {
                Section::Errors => report.errors.push(item.to_string()),
                Section::Warnings => report.warnings.push(item.to_string()),
                Section::None => {}
            }
        }
    }

    report
}
