//! Audio encoding.

use ffmpeg_next as ffmpeg;

use ffmpeg::ChannelLayout;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;
use crate::transcode::resampler::ENCODER_SAMPLE_FORMAT;

/// Fallback frame size for codecs that do not report one. MP3 frames are
/// fixed at 1152 samples per channel.
const MP3_FRAME_SIZE: usize = 1152;

/// Default encoder bit rate.
pub const DEFAULT_BIT_RATE: usize = 192_000;

/// Wraps an FFmpeg audio encoder plus the bookkeeping the muxer needs.
///
/// The codec buffers internally, so packets lag frames by the encoder
/// delay. `flush` drains that delay and is valid exactly once, after the
/// last frame; the encoder accepts nothing afterwards.
pub struct AudioEncoder {
    encoder: ffmpeg::encoder::Audio,
    codec_id: ffmpeg::codec::Id,
    frame_size: usize,
    sample_rate: u32,
    time_base: ffmpeg::Rational,
    pts: i64,
    flushed: bool,
}

impl AudioEncoder {
    /// Find and open an encoder for `codec_id`.
    pub fn open(
        codec_id: ffmpeg::codec::Id,
        sample_rate: u32,
        channel_layout: ChannelLayout,
        bit_rate: usize,
    ) -> Result<Self> {
        let codec = ffmpeg::codec::encoder::find(codec_id).ok_or_else(|| {
            PipelineError::Encode(format!("no encoder available for {codec_id:?}"))
        })?;

        let mut context = ffmpeg::codec::Context::new_with_codec(codec);
        let time_base = ffmpeg::Rational::new(1, sample_rate as i32);
        context.set_time_base(time_base);

        let mut audio = context
            .encoder()
            .audio()
            .map_err(|e| PipelineError::Encode(format!("creating audio encoder: {e}")))?;
        audio.set_rate(sample_rate as i32);
        audio.set_format(ENCODER_SAMPLE_FORMAT);
        audio.set_channel_layout(channel_layout);
        audio.set_bit_rate(bit_rate);

        let encoder = audio
            .open_as(codec)
            .map_err(|e| PipelineError::Encode(format!("opening encoder: {e}")))?;

        let frame_size = match encoder.frame_size() as usize {
            0 => MP3_FRAME_SIZE,
            size => size,
        };

        tracing::debug!(
            codec = ?codec_id,
            sample_rate,
            bit_rate,
            frame_size,
            "Opened audio encoder"
        );

        Ok(Self {
            encoder,
            codec_id,
            frame_size,
            sample_rate,
            time_base,
            pts: 0,
            flushed: false,
        })
    }

    /// Encode one frame, returning whatever packets the codec emits.
    pub fn encode(&mut self, frame: &ffmpeg::frame::Audio) -> Result<Vec<ffmpeg::Packet>> {
        if self.flushed {
            return Err(PipelineError::Encode(
                "encoder already flushed".to_string(),
            ));
        }
        self.encoder
            .send_frame(frame)
            .map_err(|e| PipelineError::Encode(format!("sending frame: {e}")))?;
        self.receive_packets()
    }

    /// Drain the codec delay. Valid exactly once, after the last frame.
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::Packet>> {
        if self.flushed {
            return Err(PipelineError::Encode(
                "encoder already flushed".to_string(),
            ));
        }
        self.flushed = true;
        self.encoder
            .send_eof()
            .map_err(|e| PipelineError::Encode(format!("sending EOF: {e}")))?;
        self.receive_packets()
    }

    fn receive_packets(&mut self) -> Result<Vec<ffmpeg::Packet>> {
        let mut packets = Vec::new();
        loop {
            let mut packet = ffmpeg::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    // Some codecs leave timestamps unset; synthesize them
                    // from the running sample position.
                    if packet.pts().is_none() {
                        packet.set_pts(Some(self.pts));
                        packet.set_dts(Some(self.pts));
                    }
                    self.pts += self.frame_size as i64;
                    packets.push(packet);
                }
                Err(ffmpeg::Error::Other {
                    errno: ffmpeg::error::EAGAIN,
                })
                | Err(ffmpeg::Error::Eof) => break,
                Err(e) => {
                    return Err(PipelineError::Encode(format!("receiving packet: {e}")))
                }
            }
        }
        Ok(packets)
    }

    /// Samples per frame this codec expects.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Time base packets are stamped in, one tick per sample.
    pub fn time_base(&self) -> ffmpeg::Rational {
        self.time_base
    }

    pub fn codec_id(&self) -> ffmpeg::codec::Id {
        self.codec_id
    }

    /// Parameters for configuring the output stream.
    pub fn codec_parameters(&self) -> ffmpeg::codec::Parameters {
        helpers::encoder_codec_parameters(&self.encoder)
    }
}

/// Whether this FFmpeg build carries an encoder for `codec_id`.
pub fn is_encoder_available(codec_id: ffmpeg::codec::Id) -> bool {
    ffmpeg::codec::encoder::find(codec_id).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn silent_frame(samples: usize, pts: i64) -> ffmpeg::frame::Audio {
        let mut frame =
            ffmpeg::frame::Audio::new(ENCODER_SAMPLE_FORMAT, samples, ChannelLayout::STEREO);
        frame.set_rate(44_100);
        frame.set_pts(Some(pts));
        for channel in 0..frame.planes() {
            helpers::audio_plane_data_mut(&mut frame, channel).fill(0);
        }
        frame
    }

    #[test]
    fn test_mp3_encoder_reports_fixed_frame_size() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_encoder_available(ffmpeg::codec::Id::MP3) {
            return;
        }
        let encoder = AudioEncoder::open(
            ffmpeg::codec::Id::MP3,
            44_100,
            ChannelLayout::STEREO,
            DEFAULT_BIT_RATE,
        )
        .unwrap();
        assert_eq!(encoder.frame_size(), 1152);
        assert_eq!(encoder.sample_rate(), 44_100);
        assert_eq!(encoder.codec_id(), ffmpeg::codec::Id::MP3);
    }

    #[test]
    fn test_flush_drains_delay_exactly_once() {
        crate::ffmpeg_utils::init().unwrap();
        if !is_encoder_available(ffmpeg::codec::Id::MP3) {
            return;
        }
        let mut encoder = AudioEncoder::open(
            ffmpeg::codec::Id::MP3,
            44_100,
            ChannelLayout::STEREO,
            DEFAULT_BIT_RATE,
        )
        .unwrap();

        let frame_size = encoder.frame_size();
        let mut pts = 0i64;
        let mut before_flush = 0usize;
        for _ in 0..10 {
            let frame = silent_frame(frame_size, pts);
            pts += frame_size as i64;
            before_flush += encoder.encode(&frame).unwrap().len();
        }

        let tail = encoder.flush().unwrap();
        assert!(!tail.is_empty(), "flush must drain the codec delay");
        assert!(before_flush + tail.len() >= 10);

        // Nothing may be sent after the flush, and a second flush is a
        // caller bug.
        assert!(encoder.flush().is_err());
        let frame = silent_frame(frame_size, pts);
        assert!(encoder.encode(&frame).is_err());
    }

    #[test]
    fn test_unavailable_codec_reports_encode_error() {
        crate::ffmpeg_utils::init().unwrap();
        // No build ships an encoder for the null codec id; opening must
        // fail cleanly rather than panic.
        let result = AudioEncoder::open(
            ffmpeg::codec::Id::None,
            44_100,
            ChannelLayout::STEREO,
            DEFAULT_BIT_RATE,
        );
        assert!(matches!(result, Err(PipelineError::Encode(_))));
    }
}
