// SPDX-License-Identifier: MIT

//! Scheduler trigger route.
//!
//! Called by the external scheduler, not by users. The invoker is
//! authenticated by a shared secret in the `x-sync-trigger-secret` header,
//! compared in constant time and rejected before any work begins.

use crate::models::BatchSummary;
use crate::AppState;
use axum::{
    extract::{Json as ExtractJson, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Header carrying the scheduler's shared secret.
const TRIGGER_SECRET_HEADER: &str = "x-sync-trigger-secret";

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/sync-all", post(sync_all))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncAllPayload {
    /// Explicit target date; defaults to tomorrow, server time
    pub date: Option<NaiveDate>,
}

/// Whether the presented secret matches the configured one.
fn trigger_authorized(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(TRIGGER_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|presented| presented.as_bytes().ct_eq(expected.as_bytes()).into())
        .unwrap_or(false)
}

/// Run the scheduled stack sync across all users.
async fn sync_all(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<ExtractJson<SyncAllPayload>>,
) -> Result<Json<BatchSummary>, StatusCode> {
    if !trigger_authorized(&headers, &state.config.sync_trigger_secret) {
        tracing::warn!("Blocked sync-all request with missing or invalid trigger secret");
        return Err(StatusCode::FORBIDDEN);
    }

    let date = payload.and_then(|Json(p)| p.date);

    match state.runner.run(date).await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::error!(error = %e, "Scheduled sync batch failed to start");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
