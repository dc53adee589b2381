// SPDX-License-Identifier: MIT

//! Peloplan API Server
//!
//! Synchronizes locally planned workouts to the Peloton class stack and
//! reconstructs FTP test history, on user demand and on a nightly schedule.

use peloplan::{
    config::Config,
    db::{FirestoreStore, PlannerStore},
    services::{PelotonClient, RetryPolicy, ScheduledRunner, SyncService, TokenCipher},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Peloplan API");

    // The cipher key is validated here; a bad key must halt startup rather
    // than let the service degrade to storing plaintext tokens.
    let cipher =
        TokenCipher::new(&config.token_encryption_key).expect("Invalid token encryption key");
    tracing::info!("Token cipher initialized");

    // Initialize Firestore record store
    let store: Arc<dyn PlannerStore> = Arc::new(
        FirestoreStore::new(&config.gcp_project_id)
            .await
            .expect("Failed to connect to Firestore"),
    );

    // Peloton API client (shared across users; tokens are passed per call)
    let api = Arc::new(PelotonClient::from_config(&config));

    // Per-user sync locks, shared so two syncs for one user never interleave
    let sync_locks = Arc::new(dashmap::DashMap::new());

    let sync_service = SyncService::new(
        api,
        Arc::clone(&store),
        cipher,
        RetryPolicy::default(),
        sync_locks,
    );
    let runner = ScheduledRunner::new(Arc::clone(&store), sync_service.clone());

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        sync_service,
        runner,
    });

    // Build router
    let app = peloplan::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("peloplan=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
