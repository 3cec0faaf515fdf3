//! Configuration loading and resolution
//!
//! Resolution priority for every setting:
//! 1. Environment variable (`COGPRESS_*`, highest priority)
//! 2. TOML config file (`COGPRESS_CONFIG` path, else `~/.config/cogpress/cogpress.toml`)
//! 3. Compiled default (fallback)
//!
//! A missing or unparseable config file logs a warning and falls back to
//! defaults; it never prevents startup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

/// Default HTTP bind address for the ingest service
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:5731";

/// Target encoding configuration handed to the transcoder.
///
/// The four fields are the complete configuration surface of a conversion.
/// One profile is fixed per deployment; requests cannot override it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodingProfile {
    /// Output driver name
    pub format: String,
    /// Internal tiling
    pub tiled: bool,
    /// Compression scheme
    pub compression: String,
    /// Tile block size in pixels
    pub block_size: u32,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            format: "COG".to_string(),
            tiled: true,
            compression: "DEFLATE".to_string(),
            block_size: 512,
        }
    }
}

/// Service configuration for cogpress-ingest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP bind address
    pub bind_address: String,
    /// Where source rasters are read from (`s3://bucket[/prefix]` or a local directory)
    pub input_location: String,
    /// Where finalized artifacts are published (`s3://bucket[/prefix]` or a local directory)
    pub output_location: String,
    /// Required spatial reference system (EPSG code)
    pub target_epsg: u32,
    /// Local staging directory shared by all requests
    pub staging_dir: PathBuf,
    /// Upper bound on a single transcoder invocation
    pub transcode_timeout_secs: u64,
    /// gdalinfo executable
    pub gdalinfo_bin: String,
    /// gdal_translate executable
    pub gdal_translate_bin: String,
    /// COG validator executable
    pub validator_bin: String,
    /// Fixed encoding profile applied to every conversion
    pub encoding: EncodingProfile,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            input_location: "s3://kdg-raw".to_string(),
            output_location: "s3://final-cog".to_string(),
            target_epsg: 4326,
            staging_dir: std::env::temp_dir().join("cogpress-staging"),
            transcode_timeout_secs: 600,
            gdalinfo_bin: "gdalinfo".to_string(),
            gdal_translate_bin: "gdal_translate".to_string(),
            validator_bin: "validate_cloud_optimized_geotiff.py".to_string(),
            encoding: EncodingProfile::default(),
        }
    }
}

impl ServiceConfig {
    /// Resolve configuration from all tiers.
    pub fn resolve() -> Self {
        let mut config = match Self::load_toml() {
            Some(config) => config,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config
    }

    /// Locate the TOML config file.
    ///
    /// `COGPRESS_CONFIG` wins; otherwise the per-user config directory.
    pub fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("COGPRESS_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|d| d.join("cogpress").join("cogpress.toml"))
    }

    fn load_toml() -> Option<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return None;
        }
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                return None;
            }
        };
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse config file {}: {}", path.display(), e);
                None
            }
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("COGPRESS_BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let Ok(value) = std::env::var("COGPRESS_INPUT_LOCATION") {
            self.input_location = value;
        }
        if let Ok(value) = std::env::var("COGPRESS_OUTPUT_LOCATION") {
            self.output_location = value;
        }
        if let Ok(value) = std::env::var("COGPRESS_TARGET_EPSG") {
            match value.parse() {
                Ok(code) => self.target_epsg = code,
                Err(_) => warn!("Ignoring non-numeric COGPRESS_TARGET_EPSG: {}", value),
            }
        }
        if let Ok(value) = std::env::var("COGPRESS_STAGING_DIR") {
            self.staging_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("COGPRESS_TRANSCODE_TIMEOUT_SECS") {
            match value.parse() {
                Ok(secs) => self.transcode_timeout_secs = secs,
                Err(_) => warn!(
                    "Ignoring non-numeric COGPRESS_TRANSCODE_TIMEOUT_SECS: {}",
                    value
                ),
            }
        }
    }

    /// Create the staging directory if missing.
    pub fn ensure_staging_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.staging_dir)
            .map_err(|e| Error::Config(format!("Failed to create staging directory: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_tiled_deflate_cog() {
        let profile = EncodingProfile::default();
        assert_eq!(profile.format, "COG");
        assert!(profile.tiled);
        assert_eq!(profile.compression, "DEFLATE");
        assert_eq!(profile.block_size, 512);
    }

    #[test]
    fn default_config_targets_wgs84() {
        let config = ServiceConfig::default();
        assert_eq!(config.target_epsg, 4326);
        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(!config.staging_dir.as_os_str().is_empty());
    }

    #[test]
    fn profile_deserializes_with_partial_fields() {
        let profile: EncodingProfile = toml::from_str("compression = \"LZW\"").unwrap();
        assert_eq!(profile.compression, "LZW");
        assert_eq!(profile.format, "COG");
        assert_eq!(profile.block_size, 512);
    }
}
