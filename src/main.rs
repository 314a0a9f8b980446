// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sorikama Hub API Server
//!
//! Authenticates portal users once and proxies them to registered services
//! under per-service encrypted identities.

use anyhow::Context;
use sorikama_hub::{
    config::Config,
    db::FirestoreDb,
    services::{build_revocation_store, sweeper},
    AppState,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize structured JSON logging for GCP
    init_logging()?;

    // Load configuration from environment
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!(port = config.port, hub = %config.hub_name, "Starting Sorikama Hub");

    // Firestore holds grants, audit records and the service registry
    let db = Arc::new(
        FirestoreDb::new(&config.gcp_project_id)
            .await
            .context("Failed to connect to Firestore")?,
    );

    // Revocation cache (falls back to fail-open when Redis is unavailable)
    let revocation = build_revocation_store(&config).await;
    tracing::info!(
        backend = revocation.backend_name(),
        "Revocation store initialized"
    );

    let state = Arc::new(AppState::new(
        config.clone(),
        db.clone(),
        db.clone(),
        db,
        revocation,
    )?);

    sweeper::spawn_sweeper(
        Arc::clone(&state.ledger),
        state.audit.clone(),
        config.sweep_interval_secs,
    );

    // Build router
    let app = sorikama_hub::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() -> anyhow::Result<()> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("sorikama_hub=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .try_init()?;
    Ok(())
}
