//! Pipeline stages, one module per stage.

pub(crate) mod decoder;
pub(crate) mod encoder;
pub(crate) mod pipeline;
pub(crate) mod reader;
pub(crate) mod resampler;
pub(crate) mod writer;
