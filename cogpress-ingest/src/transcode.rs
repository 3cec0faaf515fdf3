//! Raster transcoding via `gdal_translate`
//!
//! The transcoder is an external tool invoked as a child process with the
//! deployment's fixed encoding profile. A failed or timed-out invocation is
//! fatal for the request; nothing here retries.

use async_trait::async_trait;
use cogpress_common::EncodingProfile;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Transcoder invocation failed
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("gdal_translate exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("transcode timed out after {0} seconds")]
    Timeout(u64),

    #[error("failed to run transcoder: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Capability interface for re-encoding a raster to a destination path
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(
        &self,
        src: &str,
        dst: &Path,
        profile: &EncodingProfile,
    ) -> Result<(), TranscodeError>;
}

/// Production transcoder backed by the `gdal_translate` command-line tool
pub struct GdalTranslate {
    bin: String,
    timeout: Duration,
}

impl GdalTranslate {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

/// Render an encoding profile as `gdal_translate` arguments.
fn profile_args(profile: &EncodingProfile) -> Vec<String> {
    vec![
        "-of".to_string(),
        profile.format.clone(),
        "-co".to_string(),
        format!("TILED={}", if profile.tiled { "YES" } else { "NO" }),
        "-co".to_string(),
        format!("COMPRESS={}", profile.compression),
        "-co".to_string(),
        format!("BLOCKSIZE={}", profile.block_size),
    ]
}

#[async_trait]
impl Transcoder for GdalTranslate {
    async fn transcode(
        &self,
        src: &str,
        dst: &Path,
        profile: &EncodingProfile,
    ) -> Result<(), TranscodeError> {
        let args = profile_args(profile);
        debug!(command = %self.bin, ?args, src, dst = %dst.display(), "Transcoding raster");

        let mut command = Command::new(&self.bin);
        command
            .args(&args)
            .arg(src)
            .arg(dst)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the in-flight future on timeout must also reap the child.
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Err(_) => return Err(TranscodeError::Timeout(self.timeout.as_secs())),
            Ok(result) => result?,
        };

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(())
    }
}
