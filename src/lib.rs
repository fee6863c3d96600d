//! # Resumable Sensor Upload Server
//!
//! A resumable, chunked upload server for mobile-sensor measurement data
//! (geolocation tracks and their attachments: logs, images, video).
//!
//! ## Protocol
//!
//! - **Pre-request**: `POST /measurements` or
//!   `POST /measurements/{measurementId}/attachments` announces a new
//!   upload's metadata and returns a session `Location` to PUT chunks to.
//! - **Chunk / status**: `PUT .../{sessionId}` either appends a chunk
//!   (`Content-Range: bytes F-T/N`) or, with an empty body
//!   (`Content-Range: bytes */N`), reports how many bytes the server has
//!   so far so the client can resume.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │                   HTTP Server                       │
//! │  ┌────────────────┐        ┌─────────────────────┐ │
//! │  │ Measurement API │        │   Attachment API    │ │
//! │  └────────────────┘        └─────────────────────┘ │
//! ├───────────────────────────────────────────────────┤
//! │                   UploadEngine                      │
//! ├───────────────────────────────────────────────────┤
//! │  SessionStore (in-memory)  │  StorageService (fs)   │
//! │                             │  + ObjectIndex (rocksdb)│
//! └───────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod metadata_extractor;
pub mod middleware;
pub mod models;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{Result, UploadError};
pub use state::AppState;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};
use tracing::info;

use crate::auth::BearerAuth;
use crate::middleware::RateLimiter;

/// Run the resumable upload server with the given configuration.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let state = AppState::new(config.clone()).await?;
    let app = create_router(state.clone());

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(address = %addr, "resumable upload server starting");

    let cleanup_state = state.clone();
    tokio::spawn(async move {
        cleanup_task(cleanup_state).await;
    });

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router: measurement/attachment routes plus the
/// ambient layers (CORS, body limit, rate limiting, bearer auth, tracing).
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any);

    let body_limit = RequestBodyLimitLayer::new(state.max_chunk_payload_size() as usize + 4096);

    let rate_limiter = RateLimiter::new(&state.config.rate_limit);
    let auth = BearerAuth::new(&state.config.auth);

    if state.config.auth.enabled {
        info!(tokens = state.config.auth.tokens.len(), "bearer token authentication enabled");
    }
    if state.config.rate_limit.enabled {
        info!(
            requests_per_window = state.config.rate_limit.requests_per_window,
            window_seconds = state.config.rate_limit.window_seconds,
            "rate limiting enabled"
        );
    }

    Router::new()
        .nest("/measurements", handlers::measurement_routes())
        .nest("/measurements/{measurementId}/attachments", handlers::attachment_routes())
        .nest("/health", handlers::health_routes())
        .layer(cors)
        .layer(body_limit)
        .layer(auth.layer())
        .layer(rate_limiter.layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Periodic sweep of expired sessions and orphaned upload handles (§4.5
/// Open Question c: scheduling lives in the ambient runtime, not the
/// engine itself).
async fn cleanup_task(state: AppState) {
    let interval = state.cleanup_interval();

    loop {
        tokio::time::sleep(interval).await;

        let expired = state.sessions.sweep_expired().await;
        if !expired.is_empty() {
            info!(count = expired.len(), "swept expired sessions");
        }

        match state.storage.sweep_orphans(state.orphan_sweep_age()).await {
            Ok(count) if count > 0 => info!(count, "swept orphaned upload handles"),
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "orphan sweep failed"),
        }
    }
}
