//! The single-pass transcode pipeline.
//!
//! Wires the stages together: read packets from the source container,
//! decode, resample into the encoder's frame size, encode, and mux into
//! the destination. Packets flow strictly in demux order and every stage
//! is flushed exactly once when the source runs dry.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ffmpeg_next as ffmpeg;
use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::ffmpeg_utils::helpers;
use crate::transcode::decoder::AudioDecoder;
use crate::transcode::encoder::{AudioEncoder, DEFAULT_BIT_RATE};
use crate::transcode::reader::SourceReader;
use crate::transcode::resampler::{AudioResampler, ResampleTarget};
use crate::transcode::writer::OutputWriter;

/// Output sample rate used when the source does not report one.
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

/// What to transcode and how.
#[derive(Debug, Clone)]
pub struct TranscodeOptions {
    pub source: PathBuf,
    pub destination: PathBuf,
    /// Container format name passed to the muxer.
    pub container_format: String,
    pub codec: ffmpeg::codec::Id,
    pub bit_rate: usize,
    /// Output sample rate; `None` keeps the source rate.
    pub sample_rate: Option<u32>,
}

impl TranscodeOptions {
    /// Options for an MP3 transcode at the default bit rate.
    pub fn new(source: impl Into<PathBuf>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            container_format: "mp3".to_string(),
            codec: ffmpeg::codec::Id::MP3,
            bit_rate: DEFAULT_BIT_RATE,
            sample_rate: None,
        }
    }
}

/// Pipeline lifecycle. A run moves Init to Reading to Flushing to Closed;
/// any failure lands in Aborted and the output file is not to be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    Reading,
    Flushing,
    Closed,
    Aborted,
}

/// Counters gathered over one completed run.
#[derive(Debug, Clone, Serialize)]
pub struct TranscodeReport {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packets_demuxed: u64,
    /// Demuxed packets dropped for missing decode timestamps.
    pub packets_skipped: u64,
    pub frames_decoded: u64,
    pub packets_muxed: u64,
    pub samples_written: u64,
    pub sample_rate: u32,
    pub channels: u16,
    pub channel_layout: String,
}

impl TranscodeReport {
    /// Duration of the written audio, derived from the sample count.
    pub fn output_duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples_written as f64 / self.sample_rate as f64
    }
}

/// Mutable pipeline stages plus the counters they feed.
struct RunContext {
    /// Built lazily from the first decoded frame, which carries the real
    /// source format.
    resampler: Option<AudioResampler>,
    encoder: AudioEncoder,
    writer: OutputWriter,
    target: ResampleTarget,
    report: TranscodeReport,
    next_pts: i64,
}

impl RunContext {
    fn handle_frame(&mut self, frame: &ffmpeg::frame::Audio) -> Result<()> {
        self.report.frames_decoded += 1;
        if self.resampler.is_none() {
            self.resampler = Some(AudioResampler::new(frame, self.target)?);
        }
        let mut converted = Vec::new();
        if let Some(resampler) = self.resampler.as_mut() {
            converted = resampler.convert(frame)?;
        }
        self.encode_frames(converted)
    }

    fn encode_frames(&mut self, frames: Vec<ffmpeg::frame::Audio>) -> Result<()> {
        for mut frame in frames {
            frame.set_pts(Some(self.next_pts));
            self.next_pts += frame.samples() as i64;
            let packets = self.encoder.encode(&frame)?;
            self.mux_packets(packets)?;
        }
        Ok(())
    }

    fn mux_packets(&mut self, packets: Vec<ffmpeg::Packet>) -> Result<()> {
        for mut packet in packets {
            let duration = packet.duration();
            self.report.samples_written += if duration > 0 {
                duration as u64
            } else {
                self.encoder.frame_size() as u64
            };
            self.writer.write(&mut packet)?;
            self.report.packets_muxed += 1;
        }
        Ok(())
    }

    fn drain_decoder(&mut self, decoder: &mut AudioDecoder) -> Result<()> {
        while let Some(frame) = decoder.receive_frame()? {
            self.handle_frame(&frame)?;
        }
        Ok(())
    }
}

/// Demuxers occasionally emit packets with no decode timestamp; they
/// cannot be ordered against the stream and are dropped.
fn has_decode_timestamp(packet: &ffmpeg::Packet) -> bool {
    packet.dts().is_some()
}

/// Drives one source file through the pipeline.
pub struct Transcoder {
    options: TranscodeOptions,
    state: PipelineState,
    cancel: Arc<AtomicBool>,
}

impl Transcoder {
    pub fn new(options: TranscodeOptions) -> Self {
        Self {
            options,
            state: PipelineState::Init,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Shared flag checked once per demuxed packet. Setting it makes the
    /// run fail with `Cancelled`; the partial output is not finalized.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Run the pipeline to completion.
    pub fn run(&mut self) -> Result<TranscodeReport> {
        match self.drive() {
            Ok(report) => {
                self.state = PipelineState::Closed;
                tracing::info!(
                    source = %self.options.source.display(),
                    destination = %self.options.destination.display(),
                    bytes_in = report.bytes_in,
                    bytes_out = report.bytes_out,
                    seconds = format!("{:.2}", report.output_duration_secs()),
                    "Transcode complete"
                );
                Ok(report)
            }
            Err(e) => {
                self.state = PipelineState::Aborted;
                // Without a trailer the output is unplayable; remove it
                // rather than leave a truncated file behind.
                if self.options.destination.exists() {
                    let _ = std::fs::remove_file(&self.options.destination);
                }
                tracing::warn!(
                    source = %self.options.source.display(),
                    error = %e,
                    "Transcode aborted"
                );
                Err(e)
            }
        }
    }

    fn drive(&mut self) -> Result<TranscodeReport> {
        crate::ffmpeg_utils::init()?;

        let mut reader = SourceReader::open(&self.options.source)?;
        let bytes_in = std::fs::metadata(&self.options.source)?.len();

        let mut decoder = AudioDecoder::open(&reader.parameters(), reader.stream_index())?;

        let sample_rate = self
            .options
            .sample_rate
            .unwrap_or_else(|| match decoder.sample_rate() {
                0 => DEFAULT_SAMPLE_RATE,
                rate => rate,
            });
        let channels = match decoder.channels() {
            0 => 2,
            count => count,
        };
        let channel_layout = helpers::fallback_channel_layout(decoder.channel_layout(), channels);

        let encoder = AudioEncoder::open(
            self.options.codec,
            sample_rate,
            channel_layout,
            self.options.bit_rate,
        )?;
        let writer = OutputWriter::create(
            &self.options.destination,
            &self.options.container_format,
            &encoder,
        )?;

        let target = ResampleTarget {
            sample_rate,
            channel_layout,
            channels,
            frame_samples: encoder.frame_size(),
        };

        let mut ctx = RunContext {
            resampler: None,
            encoder,
            writer,
            target,
            report: TranscodeReport {
                bytes_in,
                bytes_out: 0,
                packets_demuxed: 0,
                packets_skipped: 0,
                frames_decoded: 0,
                packets_muxed: 0,
                samples_written: 0,
                sample_rate,
                channels,
                channel_layout: helpers::channel_layout_name(channel_layout, channels),
            },
            next_pts: 0,
        };

        self.state = PipelineState::Reading;
        while let Some(packet) = reader.next_packet()? {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(PipelineError::Cancelled);
            }
            ctx.report.packets_demuxed += 1;
            if !has_decode_timestamp(&packet) {
                ctx.report.packets_skipped += 1;
                continue;
            }
            decoder.send_packet(&packet)?;
            ctx.drain_decoder(&mut decoder)?;
        }

        // Source dry: flush every stage once, in pipeline order.
        self.state = PipelineState::Flushing;
        decoder.send_eof()?;
        ctx.drain_decoder(&mut decoder)?;

        let tail_frames = match ctx.resampler.as_mut() {
            Some(resampler) => resampler.flush()?,
            None => Vec::new(),
        };
        ctx.encode_frames(tail_frames)?;

        let tail_packets = ctx.encoder.flush()?;
        ctx.mux_packets(tail_packets)?;

        let RunContext {
            writer, mut report, ..
        } = ctx;
        writer.finalize()?;

        report.bytes_out = std::fs::metadata(&self.options.destination)?.len();
        Ok(report)
    }
}

/// Transcode one file with `options`, returning the run counters.
pub fn transcode(options: TranscodeOptions) -> Result<TranscodeReport> {
    Transcoder::new(options).run()
}
