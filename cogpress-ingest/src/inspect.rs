//! Raster metadata inspection
//!
//! Opens a source raster through `gdalinfo -json` and extracts its spatial
//! reference identifier. Opening is the only terminal failure here: a raster
//! with unrecognizable projection metadata still inspects successfully, it
//! just reports no EPSG code, which downstream treats as a reference
//! mismatch.

use async_trait::async_trait;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Metadata extracted from a source raster
#[derive(Debug, Clone, PartialEq)]
pub struct RasterInfo {
    /// EPSG code of the raster's spatial reference, if one could be identified
    pub epsg: Option<u32>,
}

/// Source raster could not be opened. Terminal for the request, not retried.
#[derive(Debug, Error)]
#[error("failed to open raster {path}: {detail}")]
pub struct InspectError {
    pub path: String,
    pub detail: String,
}

/// Capability interface for opening a raster and reading its metadata
#[async_trait]
pub trait RasterInspector: Send + Sync {
    async fn inspect(&self, path: &str) -> Result<RasterInfo, InspectError>;
}

/// Production inspector backed by the `gdalinfo` command-line tool
pub struct GdalInfoInspector {
    bin: String,
}

impl GdalInfoInspector {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl RasterInspector for GdalInfoInspector {
    async fn inspect(&self, path: &str) -> Result<RasterInfo, InspectError> {
        debug!(command = %self.bin, path, "Inspecting raster metadata");

        let output = Command::new(&self.bin)
            .arg("-json")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| InspectError {
                path: path.to_string(),
                detail: format!("failed to run {}: {}", self.bin, e),
            })?;

        if !output.status.success() {
            return Err(InspectError {
                path: path.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let doc: serde_json::Value =
            serde_json::from_slice(&output.stdout).map_err(|e| InspectError {
                path: path.to_string(),
                detail: format!("unparseable {} output: {}", self.bin, e),
            })?;

        Ok(RasterInfo {
            epsg: epsg_from_gdalinfo(&doc),
        })
    }
}

/// Pull an EPSG code out of a `gdalinfo -json` document.
///
/// Prefers the STAC projection summary when present, then falls back to
/// scanning the coordinate system WKT. Returns None for anything it cannot
/// recognize.
fn epsg_from_gdalinfo(doc: &serde_json::Value) -> Option<u32> {
    if let Some(code) = doc
        .get("stac")
        .and_then(|s| s.get("proj:epsg"))
        .and_then(|c| c.as_u64())
    {
        return u32::try_from(code).ok();
    }
    doc.get("coordinateSystem")
        .and_then(|cs| cs.get("wkt"))
        .and_then(|wkt| wkt.as_str())
        .and_then(epsg_from_wkt)
}

/// Extract the authority code from a projection WKT string.
///
/// Handles both WKT2 (`ID["EPSG",4326]`) and WKT1 (`AUTHORITY["EPSG","4326"]`)
/// spellings. The last identifier in the string is the one attached to the
/// outermost CRS node, so that is the one taken.
fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    const WKT2_MARKER: &str = "ID[\"EPSG\",";
    const WKT1_MARKER: &str = "AUTHORITY[\"EPSG\",\"";

    if let Some(idx) = wkt.rfind(WKT2_MARKER) {
        if let Some(code) = leading_number(&wkt[idx + WKT2_MARKER.len()..]) {
            return Some(code);
        }
    }
    if let Some(idx) = wkt.rfind(WKT1_MARKER) {
        if let Some(code) = leading_number(&wkt[idx + WKT1_MARKER.len()..]) {
            return Some(code);
        }
    }
    None
}

fn leading_number(s: &str) -> Option<u32> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}
