use std::path::Path;

use crate::error::Result;
use crate::transcode::pipeline;

pub use crate::ffmpeg_utils::helpers::codec_id_from_name;
pub use crate::probe::{probe, AudioTrackInfo, MediaProbe};
pub use crate::transcode::encoder::{is_encoder_available, DEFAULT_BIT_RATE};
pub use crate::transcode::pipeline::{
    transcode, PipelineState, TranscodeOptions, TranscodeReport, Transcoder, DEFAULT_SAMPLE_RATE,
};
pub use crate::transcode::resampler::ENCODER_SAMPLE_FORMAT;

/// Transcode `source` into an MP3 file at `destination` with the default
/// options.
pub fn transcode_file(source: &Path, destination: &Path) -> Result<TranscodeReport> {
    pipeline::transcode(TranscodeOptions::new(source, destination))
}
