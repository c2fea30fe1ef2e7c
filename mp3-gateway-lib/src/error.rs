//! Error types for the transcoding library.
//!
//! Every stage of the pipeline maps its failures onto [`PipelineError`] so
//! callers see where a run died: opening the source, finding an audio
//! stream, decoding, encoding, or muxing. All of them are fatal; the
//! pipeline never retries or resynchronizes after an error.

use thiserror::Error;

/// Top-level error type for all transcoding operations.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The FFmpeg libraries could not be initialized.
    #[error("FFmpeg initialization failed: {0}")]
    Init(String),

    /// The source could not be opened or its container not parsed.
    /// Also raised for read failures partway through the stream.
    #[error("Failed to open input: {0}")]
    Open(String),

    /// The container was opened but holds no audio stream.
    #[error("No audio stream found in input")]
    NoAudioStream,

    /// A packet failed to decode, or the decoder could not be created.
    #[error("Decoding error: {0}")]
    Decode(String),

    /// The encoder could not be configured, or a frame failed to encode.
    /// Resampling failures land here as well since the resampler exists
    /// only to feed the encoder.
    #[error("Encoding error: {0}")]
    Encode(String),

    /// The output container rejected a packet, the header, or the trailer.
    #[error("Muxing error: {0}")]
    Mux(String),

    /// The run was cancelled by the caller before reaching end of stream.
    /// The output file is not valid after this.
    #[error("Transcode cancelled")]
    Cancelled,

    /// IO failure outside the FFmpeg layer (stat, cleanup).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type used throughout the library.
pub type Result<T> = std::result::Result<T, PipelineError>;
