pub(crate) mod api;
pub(crate) mod error;
pub(crate) mod ffmpeg_utils;
pub(crate) mod probe;
pub(crate) mod transcode;

#[cfg(test)]
pub(crate) mod tests;

pub use api::*;
pub use error::{PipelineError, Result};
pub use ffmpeg_utils::version_info as ffmpeg_version_info;
pub use ffmpeg_utils::{init, quiet_native_logs};
