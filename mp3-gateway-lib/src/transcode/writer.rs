//! Output container writing.

use std::path::Path;

use ffmpeg_next as ffmpeg;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;
use crate::transcode::encoder::AudioEncoder;

/// Muxes encoded packets into an output container.
///
/// The header is written on creation and the trailer on `finalize`; a
/// writer that is dropped without `finalize` leaves an unplayable file
/// behind, which the pipeline then removes.
pub struct OutputWriter {
    output: ffmpeg::format::context::Output,
    stream_index: usize,
    stream_time_base: ffmpeg::Rational,
    encoder_time_base: ffmpeg::Rational,
    packets_written: u64,
}

impl OutputWriter {
    /// Open `path` with the named container format and write the header.
    pub fn create(path: &Path, format: &str, encoder: &AudioEncoder) -> Result<Self> {
        let mut output = ffmpeg::format::output_as(&path, format).map_err(|e| {
            PipelineError::Mux(format!("opening output {}: {e}", path.display()))
        })?;

        let encoder_time_base = encoder.time_base();
        let stream_index = {
            let mut stream = output
                .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
                .map_err(|e| PipelineError::Mux(format!("adding stream: {e}")))?;
            stream.set_parameters(encoder.codec_parameters());
            helpers::stream_reset_codec_tag(&mut stream);
            stream.set_time_base(encoder_time_base);
            stream.index()
        };

        output
            .write_header()
            .map_err(|e| PipelineError::Mux(format!("writing header: {e}")))?;

        // The muxer may adjust the time base while writing the header;
        // packets are rescaled into whatever it settled on.
        let stream_time_base = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .unwrap_or(encoder_time_base);

        tracing::debug!(
            path = %path.display(),
            format,
            stream_index,
            "Opened output container"
        );

        Ok(Self {
            output,
            stream_index,
            stream_time_base,
            encoder_time_base,
            packets_written: 0,
        })
    }

    /// Write one packet, rescaling its timestamps into the stream time base.
    pub fn write(&mut self, packet: &mut ffmpeg::Packet) -> Result<()> {
        packet.set_stream(self.stream_index);
        packet.set_position(-1);
        packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(|e| PipelineError::Mux(format!("writing packet: {e}")))?;
        self.packets_written += 1;
        Ok(())
    }

    /// Write the trailer and close the file.
    pub fn finalize(mut self) -> Result<()> {
        self.output
            .write_trailer()
            .map_err(|e| PipelineError::Mux(format!("writing trailer: {e}")))?;
        tracing::debug!(packets = self.packets_written, "Finalized output container");
        Ok(())
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcode::encoder::{is_encoder_available, DEFAULT_BIT_RATE};
    use ffmpeg::ChannelLayout;

    fn mp3_encoder() -> AudioEncoder {
        AudioEncoder::open(
            ffmpeg::codec::Id::MP3,
            44_100,
            ChannelLayout::STEREO,
            DEFAULT_BIT_RATE,
        )
        .unwrap()
    }

    #[test]
    fn test_create_fails_for_missing_directory() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_encoder_available(ffmpeg::codec::Id::MP3) {
            return;
        }
        let encoder = mp3_encoder();
        let path = Path::new("/nonexistent-dir/out.mp3");
        let result = OutputWriter::create(path, "mp3", &encoder);
        assert!(matches!(result, Err(PipelineError::Mux(_))));
    }

    #[test]
    fn test_header_and_trailer_produce_a_file() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_encoder_available(ffmpeg::codec::Id::MP3) {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.mp3");

        let encoder = mp3_encoder();
        let writer = OutputWriter::create(&path, "mp3", &encoder).unwrap();
        assert_eq!(writer.packets_written(), 0);
        writer.finalize().unwrap();

        let size = std::fs::metadata(&path).unwrap().len();
        assert!(size > 0, "header and trailer must hit the disk");
    }
}
