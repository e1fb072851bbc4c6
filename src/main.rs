//! Deployment entry point for the IPD workflow service.
//!
//! Resolves configuration from the environment once, loads (or initialises)
//! the state snapshot, and serves the REST API built in the `api-rest` crate.

use api_rest::{app, AppState};
use ipd_core::config::hospital_code_from_env_value;
use ipd_core::priority::PriorityEngine;
use ipd_core::{constants::DEFAULT_DATA_DIR, CoreConfig, Store};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the IPD application.
///
/// Starts the REST server (default port 3000) over the workflow core.
///
/// # Environment Variables
/// - `IPD_REST_ADDR`: REST server address (default: "0.0.0.0:3000")
/// - `IPD_DATA_DIR`: Directory for the state snapshot (default: "ipd_data")
/// - `IPD_HOSPITAL_CODE`: Deployment identifier used in operator output
///
/// # Returns
/// * `Ok(())` - If the server starts and runs successfully
/// * `Err(anyhow::Error)` - If startup or runtime fails
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive("ipd=info".parse()?))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rest_addr = std::env::var("IPD_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let data_dir =
        PathBuf::from(std::env::var("IPD_DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.into()));
    let hospital_code = hospital_code_from_env_value(std::env::var("IPD_HOSPITAL_CODE").ok());

    let cfg = Arc::new(CoreConfig::new(data_dir, hospital_code)?);
    let store = Arc::new(Store::load(cfg.data_dir())?);

    tracing::info!("++ Starting IPD ({}) REST on {}", cfg.hospital_code(), rest_addr);

    // First start on an empty data directory: install the reference tables.
    let engine = PriorityEngine::new(store.clone());
    if engine.rules().is_empty() {
        tracing::info!("no priority rules found; seeding defaults");
        engine.seed_defaults();
        store.persist(cfg.data_dir())?;
    }

    let state = AppState::new(cfg, store);
    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
