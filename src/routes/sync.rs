// SPDX-License-Identifier: MIT

//! User-facing sync routes.
//!
//! Session authentication is handled upstream of this service; handlers
//! trust the user ID in the path.

use crate::error::{AppError, Result};
use crate::models::{FtpTestResult, StackSyncResult, SyncTrigger};
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/users/{user_id}/sync", post(sync_now))
        .route("/api/users/{user_id}/ftp-history", get(ftp_history))
}

#[derive(Deserialize)]
struct SyncParams {
    /// Override the target date (defaults to today in the user's timezone)
    date: Option<NaiveDate>,
}

/// Push the user's plan to their remote stack right now.
async fn sync_now(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<SyncParams>,
) -> Result<Json<StackSyncResult>> {
    tracing::info!(user_id = %user_id, "User-triggered stack sync");

    let result = state
        .sync_service
        .sync_user(&user_id, SyncTrigger::Manual, params.date)
        .await?;

    Ok(Json(result))
}

#[derive(Deserialize)]
struct FtpHistoryParams {
    /// Workout ID of the most recent FTP test (head of the chain)
    start: String,
}

/// Walk the FTP test chain from the given head workout and return the
/// reconstructed history, most recent first.
async fn ftp_history(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
    Query(params): Query<FtpHistoryParams>,
) -> Result<Json<Vec<FtpTestResult>>> {
    if params.start.is_empty() {
        return Err(AppError::BadRequest("start workout id is required".to_string()));
    }

    let results = state
        .sync_service
        .ftp_history(&user_id, &params.start)
        .await?;

    Ok(Json(results))
}
