//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs the REST API server on its own.
//!
//! ## Intended use
//! This binary is useful for development and debugging when you only want the
//! REST server (with OpenAPI/Swagger UI). The workspace's main `ipd-run`
//! binary is the deployment entry point.

use api_rest::{app, AppState};
use ipd_core::config::hospital_code_from_env_value;
use ipd_core::priority::PriorityEngine;
use ipd_core::{constants::DEFAULT_DATA_DIR, CoreConfig, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the IPD REST API server.
///
/// Starts the REST API server on the configured address (default: 0.0.0.0:3000).
///
/// # Environment Variables
/// - `IPD_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `IPD_DATA_DIR`: Directory for the state snapshot (default: "ipd_data")
/// - `IPD_HOSPITAL_CODE`: Deployment identifier used in operator output
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the state snapshot cannot be loaded,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("IPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir =
        PathBuf::from(std::env::var("IPD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into()));
    let hospital_code = hospital_code_from_env_value(std::env::var("IPD_HOSPITAL_CODE").ok());

    tracing::info!("-- Starting IPD REST API on {}", addr);

    let cfg = Arc::new(CoreConfig::new(data_dir, hospital_code)?);
    let store = Arc::new(Store::load(cfg.data_dir())?);

    // First start on an empty data directory: install the reference tables.
    let engine = PriorityEngine::new(store.clone());
    if engine.rules().is_empty() {
        tracing::info!("no priority rules found; seeding defaults");
        engine.seed_defaults();
        store.persist(cfg.data_dir())?;
    }

    let state = AppState::new(cfg, store);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
