//! Resampling and frame sizing.
//!
//! Converts decoded frames to the encoder's sample format, layout, and
//! rate, then regroups the converted samples into frames of exactly the
//! encoder's frame size. Sample order is preserved end to end; nothing is
//! dropped, duplicated, or reordered. The final short frame comes out of
//! `flush`.

use ffmpeg_next as ffmpeg;

use ffmpeg::software::resampling;
use ffmpeg::util::format::sample::{Sample, Type};
use ffmpeg::ChannelLayout;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;

/// Sample format fed to the encoder. Planar signed 16-bit; this is what
/// libmp3lame consumes.
pub const ENCODER_SAMPLE_FORMAT: Sample = Sample::I16(Type::Planar);

/// Output shape the converter produces.
#[derive(Debug, Clone, Copy)]
pub struct ResampleTarget {
    pub sample_rate: u32,
    pub channel_layout: ChannelLayout,
    pub channels: u16,
    /// Samples per output frame. Zero disables regrouping, for codecs
    /// that accept arbitrary frame sizes.
    pub frame_samples: usize,
}

/// Streaming converter between the decoder's output and the encoder's
/// input.
pub struct AudioResampler {
    context: resampling::Context,
    target: ResampleTarget,
    /// Converted samples waiting to fill a whole output frame, one buffer
    /// per channel plane.
    pending: Vec<Vec<i16>>,
}

impl AudioResampler {
    /// Create a converter matching the first decoded frame.
    ///
    /// Containers occasionally declare one format and deliver another, so
    /// configuration waits for real data instead of trusting the stream
    /// parameters.
    pub fn new(src: &ffmpeg::frame::Audio, target: ResampleTarget) -> Result<Self> {
        let src_layout = helpers::fallback_channel_layout(src.channel_layout(), src.channels());
        let context = resampling::Context::get(
            src.format(),
            src_layout,
            src.rate(),
            ENCODER_SAMPLE_FORMAT,
            target.channel_layout,
            target.sample_rate,
        )
        .map_err(|e| PipelineError::Encode(format!("creating resampler: {e}")))?;

        tracing::debug!(
            src_format = ?src.format(),
            src_rate = src.rate(),
            src_channels = src.channels(),
            dst_rate = target.sample_rate,
            dst_channels = target.channels,
            frame_samples = target.frame_samples,
            "Created audio resampler"
        );

        Ok(Self {
            context,
            target,
            pending: vec![Vec::new(); target.channels as usize],
        })
    }

    /// Convert one decoded frame, returning zero or more full-size output
    /// frames.
    pub fn convert(&mut self, frame: &ffmpeg::frame::Audio) -> Result<Vec<ffmpeg::frame::Audio>> {
        // The output frame must be empty; the converter allocates it.
        let mut converted = ffmpeg::frame::Audio::empty();
        self.context
            .run(frame, &mut converted)
            .map_err(|e| PipelineError::Encode(format!("resampling frame: {e}")))?;

        if self.target.frame_samples == 0 {
            if converted.samples() == 0 {
                return Ok(Vec::new());
            }
            converted.set_rate(self.target.sample_rate);
            return Ok(vec![converted]);
        }

        self.buffer_samples(&converted);
        Ok(self.take_frames(false))
    }

    /// Drain the converter and emit everything still buffered, including
    /// a final frame shorter than `frame_samples`.
    pub fn flush(&mut self) -> Result<Vec<ffmpeg::frame::Audio>> {
        let mut converted = ffmpeg::frame::Audio::empty();
        match self.context.flush(&mut converted) {
            Ok(_) => {
                if self.target.frame_samples == 0 {
                    if converted.samples() == 0 {
                        return Ok(Vec::new());
                    }
                    converted.set_rate(self.target.sample_rate);
                    return Ok(vec![converted]);
                }
                self.buffer_samples(&converted);
            }
            // Flushing an idle converter reports an error on some builds;
            // there is nothing buffered in that case.
            Err(e) => tracing::debug!("Resampler flush returned: {}", e),
        }
        Ok(self.take_frames(true))
    }

    /// Append converted samples to the per-channel carry buffers.
    fn buffer_samples(&mut self, converted: &ffmpeg::frame::Audio) {
        let samples = converted.samples();
        if samples == 0 {
            return;
        }
        for (channel, buffer) in self.pending.iter_mut().enumerate() {
            let plane = helpers::s16_plane_as_i16(helpers::audio_plane_data(converted, channel));
            buffer.extend_from_slice(&plane[..samples]);
        }
    }

    /// Pull full frames out of the carry buffers, plus the final short
    /// frame when `include_partial` is set.
    fn take_frames(&mut self, include_partial: bool) -> Vec<ffmpeg::frame::Audio> {
        let chunk = self.target.frame_samples;
        let mut frames = Vec::new();
        if chunk == 0 {
            return frames;
        }
        while self.pending[0].len() >= chunk {
            frames.push(self.build_frame(chunk));
        }
        if include_partial && !self.pending[0].is_empty() {
            let remainder = self.pending[0].len();
            frames.push(self.build_frame(remainder));
        }
        frames
    }

    fn build_frame(&mut self, samples: usize) -> ffmpeg::frame::Audio {
        let mut frame = ffmpeg::frame::Audio::new(
            ENCODER_SAMPLE_FORMAT,
            samples,
            self.target.channel_layout,
        );
        frame.set_rate(self.target.sample_rate);
        for (channel, buffer) in self.pending.iter_mut().enumerate() {
            let taken: Vec<i16> = buffer.drain(..samples).collect();
            let plane =
                helpers::s16_plane_as_i16_mut(helpers::audio_plane_data_mut(&mut frame, channel));
            plane[..samples].copy_from_slice(&taken);
        }
        frame
    }

    /// Samples currently parked in the carry buffers.
    pub fn buffered_samples(&self) -> usize {
        self.pending.first().map_or(0, Vec::len)
    }
}
