//! MP3 Upload Gateway
//!
//! An HTTP gateway that accepts media uploads, transcodes them to MP3
//! through a single-pass FFmpeg pipeline, and forwards the results to an
//! upstream storage service.

#![allow(dead_code)]

mod config;
mod error;
mod http;
mod state;
mod upstream;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::GatewayConfig;
use crate::error::Result;
use crate::http::create_router;
use crate::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
const APP_NAME: &str = "mp3-gateway";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    tracing::info!("{} v{} starting", APP_NAME, VERSION);
    tracing::info!("FFmpeg version: {}", mp3_gateway_lib::ffmpeg_version_info());

    // Initialize FFmpeg and quiet its native log output
    mp3_gateway_lib::init()?;
    mp3_gateway_lib::quiet_native_logs();
    tracing::info!("FFmpeg initialized successfully");

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());
    let config = if std::path::Path::new(&config_path).exists() {
        match GatewayConfig::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    "Failed to load config file {}: {}. Using defaults.",
                    config_path,
                    e
                );
                GatewayConfig::default()
            }
        }
    } else {
        GatewayConfig::default()
    };
    tracing::info!("Configuration loaded: {:?}", config);

    // The staging directory must exist before the first upload lands.
    std::fs::create_dir_all(&config.staging.dir)?;

    // Create application state
    let state = Arc::new(AppState::new(config.clone()));

    // Build router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = config.socket_addr().parse().unwrap();
    tracing::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();

    Ok(())
}

/// Initialize logging with tracing
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mp3_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
