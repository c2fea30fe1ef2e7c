//! Audio decoding.

use ffmpeg_next as ffmpeg;

use crate::error::{PipelineError, Result};

/// Wraps an FFmpeg audio decoder for a single stream.
///
/// Decoding is strict: any codec error aborts the run. Nothing downstream
/// can recover from a gap in the sample stream, so damaged packets are not
/// skipped or concealed.
pub struct AudioDecoder {
    decoder: ffmpeg::decoder::Audio,
    stream_index: usize,
}

impl AudioDecoder {
    /// Build a decoder from demuxed stream parameters.
    pub fn open(parameters: &ffmpeg::codec::Parameters, stream_index: usize) -> Result<Self> {
        let context = ffmpeg::codec::Context::from_parameters(parameters.clone())
            .map_err(|e| PipelineError::Decode(format!("creating decoder context: {e}")))?;
        let decoder = context
            .decoder()
            .audio()
            .map_err(|e| PipelineError::Decode(format!("opening audio decoder: {e}")))?;

        tracing::debug!(
            stream_index,
            codec = ?parameters.id(),
            rate = decoder.rate(),
            channels = decoder.channels(),
            "Opened audio decoder"
        );

        Ok(Self {
            decoder,
            stream_index,
        })
    }

    /// Feed one demuxed packet to the decoder.
    pub fn send_packet(&mut self, packet: &ffmpeg::Packet) -> Result<()> {
        self.decoder
            .send_packet(packet)
            .map_err(|e| PipelineError::Decode(format!("sending packet: {e}")))
    }

    /// Signal end of stream so the decoder drains its internal buffer.
    pub fn send_eof(&mut self) -> Result<()> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(e) => Err(PipelineError::Decode(format!("sending EOF: {e}"))),
        }
    }

    /// Pull the next decoded frame. `None` means the decoder needs more
    /// input, or is fully drained after EOF.
    pub fn receive_frame(&mut self) -> Result<Option<ffmpeg::frame::Audio>> {
        let mut frame = ffmpeg::frame::Audio::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Some(frame)),
            Err(ffmpeg::Error::Other {
                errno: ffmpeg::error::EAGAIN,
            })
            | Err(ffmpeg::Error::Eof) => Ok(None),
            Err(e) => Err(PipelineError::Decode(format!("receiving frame: {e}"))),
        }
    }

    pub fn stream_index(&self) -> usize {
        self.stream_index
    }

    /// Sample rate the source stream reports. Zero when unknown.
    pub fn sample_rate(&self) -> u32 {
        self.decoder.rate()
    }

    pub fn channels(&self) -> u16 {
        self.decoder.channels()
    }

    pub fn channel_layout(&self) -> ffmpeg::ChannelLayout {
        self.decoder.channel_layout()
    }
}
