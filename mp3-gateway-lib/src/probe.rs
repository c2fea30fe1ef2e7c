//! Source media inspection.
//!
//! Opens a container without decoding it and reports what the demuxer
//! sees. The gateway serves this to clients before they commit to a
//! transcode.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;

/// One audio stream within a container.
#[derive(Debug, Clone, Serialize)]
pub struct AudioTrackInfo {
    pub stream_index: usize,
    pub codec: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: String,
    pub bit_rate: u64,
}

/// Container-level facts about a media file.
#[derive(Debug, Clone, Serialize)]
pub struct MediaProbe {
    pub container_format: String,
    pub duration_secs: f64,
    pub file_size: u64,
    pub audio_tracks: Vec<AudioTrackInfo>,
}

impl MediaProbe {
    pub fn has_audio(&self) -> bool {
        !self.audio_tracks.is_empty()
    }
}

/// Open `path` and report its container format and audio streams.
pub fn probe(path: &Path) -> Result<MediaProbe> {
    crate::ffmpeg_utils::init()?;

    let input = ffmpeg::format::input(&path)
        .map_err(|e| PipelineError::Open(format!("probing {}: {e}", path.display())))?;

    let container_format = input.format().name().to_string();
    let duration_secs = match input.duration() {
        duration if duration > 0 => duration as f64 / f64::from(ffmpeg::ffi::AV_TIME_BASE),
        _ => 0.0,
    };
    let file_size = std::fs::metadata(path)?.len();

    let mut audio_tracks = Vec::new();
    for (index, stream) in input.streams().enumerate() {
        let parameters = stream.parameters();
        if parameters.medium() != ffmpeg::media::Type::Audio {
            continue;
        }

        let channels = helpers::codec_params_channels(&parameters);
        // The layout lives in the codec context, not the bare parameters;
        // fall back to a channel-count guess when no decoder is built in.
        let channel_layout = ffmpeg::codec::Context::from_parameters(parameters.clone())
            .ok()
            .and_then(|context| context.decoder().audio().ok())
            .map(|decoder| helpers::channel_layout_name(decoder.channel_layout(), channels))
            .unwrap_or_else(|| {
                helpers::channel_layout_name(
                    helpers::default_layout_for_channels(channels),
                    channels,
                )
            });

        audio_tracks.push(AudioTrackInfo {
            stream_index: index,
            codec: parameters.id().name().to_string(),
            sample_rate: helpers::codec_params_sample_rate(&parameters),
            channels,
            channel_layout,
            bit_rate: helpers::codec_params_bit_rate(&parameters),
        });
    }

    tracing::debug!(
        path = %path.display(),
        format = %container_format,
        tracks = audio_tracks.len(),
        "Probed media file"
    );

    Ok(MediaProbe {
        container_format,
        duration_secs,
        file_size,
        audio_tracks,
    })
}
