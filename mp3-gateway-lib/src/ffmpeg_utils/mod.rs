//! FFmpeg initialization and low-level helpers shared by the pipeline stages.

pub(crate) mod helpers;

pub use ffmpeg_next as ffmpeg;

use crate::error::{PipelineError, Result};

/// Initialize the FFmpeg libraries. Must be called once per process before
/// any probe or transcode call.
pub fn init() -> Result<()> {
    ffmpeg::init().map_err(|e| PipelineError::Init(e.to_string()))?;
    tracing::info!("FFmpeg initialized");
    Ok(())
}

/// Cap FFmpeg's native stderr output at warning level. The libraries log at
/// info by default, which drowns structured logs in per-file banners.
pub fn quiet_native_logs() {
    // SAFETY: av_log_set_level stores an int in a global. FFmpeg does not
    // synchronize it, so call this once at startup before worker threads
    // touch the libraries.
    unsafe {
        ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_WARNING);
    }
}

/// Human-readable FFmpeg version string for diagnostics.
pub fn version_info() -> String {
    "FFmpeg 8.0+".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(version_info().starts_with("FFmpeg"));
    }
}
