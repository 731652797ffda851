//! Camera Relay Server
//!
//! Serves live camera feeds as HLS and forwards browser microphone audio to
//! the camera as Opus over RTP.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cam_relay::{config::AppConfig, device::FfmpegDeviceApi, server::WebServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting camera relay");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref()).context("loading configuration")?;

    tokio::fs::create_dir_all(&config.relay.output_dir)
        .await
        .with_context(|| format!("creating {}", config.relay.output_dir.display()))?;

    info!("Known devices:");
    for device in &config.devices {
        info!("  {} ({}) <- {}", device.name, device.id, device.source_url);
    }

    let api = Arc::new(FfmpegDeviceApi::new(
        config.relay.ffmpeg_path.clone(),
        config.devices.clone(),
    ));

    let server = WebServer::new(api, Arc::new(config));
    server.run(shutdown_signal()).await.context("web server")?;

    info!("Camera relay shut down");
    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
