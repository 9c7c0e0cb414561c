// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VidTube accounts API server
//!
//! Serves registration, login sessions and profile media for the video
//! platform, backed by Firestore and Cloudinary.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vidtube_accounts::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryUserStore, UserStore},
    services::{CloudinaryClient, MediaHost},
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(port = config.port, "Starting VidTube accounts API");

    let store: Arc<dyn UserStore> = match config.store_backend {
        StoreBackend::Firestore => Arc::new(FirestoreDb::new(&config.gcp_project_id).await?),
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory user store; data is lost on restart");
            Arc::new(MemoryUserStore::new())
        }
    };

    let media_host: Arc<dyn MediaHost> = Arc::new(CloudinaryClient::new(&config.cloudinary)?);
    tracing::info!(cloud = %config.cloudinary.cloud_name, "Media host initialized");

    let state = Arc::new(AppState::new(config.clone(), store, media_host));

    // Build router
    let app = vidtube_accounts::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("vidtube_accounts=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
