// SPDX-License-Identifier: MIT

//! Scheduled multi-tenant sync batch.
//!
//! Invoked once daily by the external scheduler. Iterates every user whose
//! stored credential has not expired and synchronizes tomorrow's plan to
//! their remote stack. Failures are isolated per user: one user's
//! decryption, auth, or API failure becomes one audit row and one error
//! string, never an aborted batch.

use crate::db::PlannerStore;
use crate::models::{BatchSummary, SyncTrigger};
use crate::services::stack_sync::SyncService;
use chrono::{Duration, NaiveDate, Utc};
use futures_util::{stream, StreamExt};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Per-user iterations are independent, so fan out with a small bound.
const MAX_CONCURRENT_USERS: usize = 8;

/// Runs the nightly stack sync across all tenants.
#[derive(Clone)]
pub struct ScheduledRunner {
    store: Arc<dyn PlannerStore>,
    sync: SyncService,
}

impl ScheduledRunner {
    pub fn new(store: Arc<dyn PlannerStore>, sync: SyncService) -> Self {
        Self { store, sync }
    }

    /// Run one batch for `date` (defaults to tomorrow, server time).
    ///
    /// Users whose qualifying workouts for the date were all pushed already
    /// are skipped without touching their remote stack, which keeps repeat
    /// invocations for the same date idempotent.
    pub async fn run(&self, date: Option<NaiveDate>) -> Result<BatchSummary, crate::error::AppError> {
        let now = Utc::now();
        let target = date.unwrap_or_else(|| (now + Duration::days(1)).date_naive());

        let users = self.store.users_with_valid_credentials(now).await?;
        tracing::info!(date = %target, users = users.len(), "Starting scheduled stack sync");

        let processed = AtomicU32::new(0);
        let succeeded = AtomicU32::new(0);
        let failed = AtomicU32::new(0);
        let errors = tokio::sync::Mutex::new(Vec::new());

        stream::iter(users)
            .for_each_concurrent(MAX_CONCURRENT_USERS, |user_id| {
                let processed = &processed;
                let succeeded = &succeeded;
                let failed = &failed;
                let errors = &errors;
                async move {
                    let workouts = match self.store.planned_workouts(&user_id, target).await {
                        Ok(w) => w,
                        Err(e) => {
                            processed.fetch_add(1, Ordering::Relaxed);
                            failed.fetch_add(1, Ordering::Relaxed);
                            errors.lock().await.push(format!("{}: {}", user_id, e));
                            return;
                        }
                    };

                    let has_unpushed = workouts
                        .iter()
                        .any(|w| w.is_stackable() && !w.pushed_to_stack);
                    if !has_unpushed {
                        tracing::debug!(user_id = %user_id, "Nothing unpushed, skipping");
                        return;
                    }

                    processed.fetch_add(1, Ordering::Relaxed);

                    match self
                        .sync
                        .sync_user(&user_id, SyncTrigger::Scheduled, Some(target))
                        .await
                    {
                        Ok(result) if result.success => {
                            succeeded.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(result) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            let message = result
                                .error
                                .unwrap_or_else(|| "sync failed".to_string());
                            errors.lock().await.push(format!("{}: {}", user_id, message));
                        }
                        Err(e) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                            errors.lock().await.push(format!("{}: {}", user_id, e));
                        }
                    }
                }
            })
            .await;

        let summary = BatchSummary {
            processed: processed.load(Ordering::Relaxed),
            succeeded: succeeded.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
            errors: errors.into_inner(),
        };

        tracing::info!(
            date = %target,
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "Scheduled stack sync finished"
        );

        Ok(summary)
    }
}
