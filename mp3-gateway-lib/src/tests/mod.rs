//! Integration testing module
//!
//! End-to-end tests for the transcode pipeline:
//! - Full file conversion and report counters
//! - Flush and short-input behavior
//! - Failure paths (missing source, no audio, unwritable output)
//! - Probe output
