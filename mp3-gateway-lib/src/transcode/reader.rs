//! Source container reading.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;

/// Demuxes the selected audio stream out of a source container.
///
/// Packets belonging to other streams are dropped. Read errors other than
/// end of stream are fatal; the reader never seeks or resynchronizes, so a
/// truncated container fails the run instead of shortening it silently.
pub struct SourceReader {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: ffmpeg::Rational,
    parameters: ffmpeg::codec::Parameters,
}

impl SourceReader {
    /// Open a container and select its best audio stream.
    pub fn open(path: &Path) -> Result<Self> {
        let input = ffmpeg::format::input(&path)
            .map_err(|e| PipelineError::Open(format!("{}: {}", path.display(), e)))?;

        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Audio)
            .ok_or(PipelineError::NoAudioStream)?;

        let stream_index = stream.index();
        let time_base = stream.time_base();
        let parameters = stream.parameters();

        tracing::debug!(
            path = %path.display(),
            stream_index,
            codec = ?parameters.id(),
            sample_rate = helpers::codec_params_sample_rate(&parameters),
            channels = helpers::codec_params_channels(&parameters),
            "Opened source container"
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            parameters,
        })
    }

    /// Read the next packet of the audio stream, or `None` at end of
    /// stream.
    pub fn next_packet(&mut self) -> Result<Option<ffmpeg::Packet>> {
        let mut packet = ffmpeg::Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() == self.stream_index {
                        return Ok(Some(packet));
                    }
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(PipelineError::Open(format!("reading packet: {e}"))),
            }
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Time base the source stream stamps its packets in.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    /// Codec parameters of the selected stream.
    pub fn parameters(&self) -> ffmpeg::codec::Parameters {
        self.parameters.clone()
    }
}
