//! HTTP server module
//!
//! This module handles HTTP request routing and handling:
//! - Axum router with all gateway endpoints
//! - Upload intake and staging
//! - Transcode and forward request handlers
//! - CORS middleware

pub mod handlers;
pub mod routes;

pub use routes::create_router;
