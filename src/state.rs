#![allow(dead_code)]

//! Application state management
//!
//! This module defines the AppState structure that holds:
//! - The upload registry (file_id -> staged file metadata)
//! - The upstream storage client
//! - Gateway configuration

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::config::GatewayConfig;
use crate::upstream::UpstreamClient;

/// One uploaded file staged on disk.
#[derive(Debug, Clone)]
pub struct StagedUpload {
    /// Server-assigned identifier
    pub file_id: String,

    /// Filename as sent by the client
    pub original_filename: String,

    /// Content type as sent by the client
    pub content_type: String,

    /// Size of the staged file in bytes
    pub size_bytes: u64,

    /// Where the upload was written
    pub staged_path: PathBuf,

    /// When the upload arrived
    pub received_at: DateTime<Utc>,

    /// Transcode result, once one has completed
    pub output: Option<TranscodedOutput>,
}

/// A finished transcode tied to an upload.
#[derive(Debug, Clone)]
pub struct TranscodedOutput {
    /// Where the output was written
    pub path: PathBuf,

    /// Output file size in bytes
    pub bytes_out: u64,

    /// Duration of the written audio in seconds
    pub duration_secs: f64,
}

/// Application state shared across all handlers
pub struct AppState {
    /// Staged uploads (file_id -> metadata)
    pub uploads: DashMap<String, StagedUpload>,

    /// Client for the upstream storage service
    pub upstream: UpstreamClient,

    /// Gateway configuration
    pub config: GatewayConfig,
}

impl AppState {
    /// Create a new AppState with the given configuration
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            uploads: DashMap::new(),
            upstream: UpstreamClient::new(&config.upstream),
            config,
        }
    }

    /// Register a staged upload
    pub fn register_upload(&self, upload: StagedUpload) {
        self.uploads.insert(upload.file_id.clone(), upload);
    }

    /// Get an upload by ID
    ///
    /// Returns a clone so no map lock is held across awaits.
    pub fn get_upload(&self, file_id: &str) -> Option<StagedUpload> {
        self.uploads.get(file_id).map(|entry| entry.clone())
    }

    /// Attach a transcode result to an upload
    pub fn set_output(&self, file_id: &str, output: TranscodedOutput) -> bool {
        match self.uploads.get_mut(file_id) {
            Some(mut entry) => {
                entry.output = Some(output);
                true
            }
            None => false,
        }
    }

    /// Number of registered uploads
    pub fn upload_count(&self) -> usize {
        self.uploads.len()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(GatewayConfig::default())
    }
}
