// SPDX-License-Identifier: MIT

//! Stack synchronization.
//!
//! The local planner is the source of truth; the remote Peloton stack is
//! always overwritten to match it. One synchronization is a clear/populate/
//! verify sequence:
//!
//! 1. Collect planned workouts for the target date, ordered by sort order.
//! 2. Empty plan: one stack-replace with an empty list (clears stale remote
//!    state), success with zero pushed.
//! 3. Truncate to the stack's 10-slot capacity; overflow is a warning, not a
//!    failure.
//! 4. Clear the remote stack. A clearing failure aborts immediately with no
//!    backoff.
//! 5. Add the remaining class IDs one at a time, in order.
//! 6. Verify the reported remote count against the expected count; a
//!    mismatch is logged but does not fail the operation.
//! 7. Non-auth failures of steps 5-6 retry with exponential backoff,
//!    re-clearing each time. An expired session propagates immediately so
//!    the caller can refresh exactly once and retry the whole sync.

use crate::db::PlannerStore;
use crate::error::AppError;
use crate::models::{PlannedWorkout, StackSyncResult, SyncLog, SyncTrigger};
use crate::services::cipher::TokenCipher;
use crate::services::ftp_history::FtpHistoryWalker;
use crate::services::peloton::{PelotonApi, PelotonRide};
use crate::services::refresh::CredentialRefresher;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The remote stack's hard capacity.
pub const STACK_CAPACITY: usize = 10;

/// Retry policy for the clear/populate loop.
///
/// Encoded as data rather than constants so tests can run with zero delays.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    pub base_delay: std::time::Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: std::time::Duration::from_secs(1),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: std::time::Duration::ZERO,
            multiplier: 2,
        }
    }

    /// Backoff delay after the given 1-based attempt.
    pub fn delay_after(&self, attempt: u32) -> std::time::Duration {
        self.base_delay * self.multiplier.saturating_pow(attempt.saturating_sub(1))
    }
}

/// Resolve the sync target date in the user's timezone, falling back to
/// server time when the timezone string is missing or invalid.
pub fn resolve_local_date(timezone: Option<&str>, now: DateTime<Utc>) -> NaiveDate {
    timezone
        .and_then(|tz| tz.parse::<chrono_tz::Tz>().ok())
        .map(|tz| now.with_timezone(&tz).date_naive())
        .unwrap_or_else(|| now.date_naive())
}

/// Result of one replace attempt plus the local workout IDs it pushed.
#[derive(Debug)]
pub struct SyncOutcome {
    pub result: StackSyncResult,
    pub pushed_workout_ids: Vec<String>,
}

/// The clear/populate/verify state machine.
///
/// Holds no per-user state; the access token is passed per call.
#[derive(Clone)]
pub struct StackSynchronizer {
    api: Arc<dyn PelotonApi>,
    policy: RetryPolicy,
}

impl StackSynchronizer {
    pub fn new(api: Arc<dyn PelotonApi>, policy: RetryPolicy) -> Self {
        Self { api, policy }
    }

    /// Replace the remote stack with the stackable subset of `workouts`.
    ///
    /// Returns `Err(AppError::AuthExpired)` without any local retry when the
    /// session is expired; every other failure is folded into the returned
    /// [`StackSyncResult`].
    pub async fn push_plan(
        &self,
        access_token: &str,
        workouts: &[PlannedWorkout],
    ) -> Result<SyncOutcome, AppError> {
        let mut queue: Vec<(String, String)> = workouts
            .iter()
            .filter(|w| w.is_stackable())
            .filter_map(|w| w.class_id.as_ref().map(|c| (w.id.clone(), c.clone())))
            .collect();

        if queue.is_empty() {
            // Intentionally clears any stale remote stack
            match self.api.modify_stack(access_token, &[]).await {
                Ok(_) => {
                    return Ok(SyncOutcome {
                        result: StackSyncResult::empty_success(),
                        pushed_workout_ids: Vec::new(),
                    })
                }
                Err(AppError::AuthExpired) => return Err(AppError::AuthExpired),
                Err(e) => {
                    return Ok(SyncOutcome {
                        result: StackSyncResult::failure(
                            0,
                            format!("failed to clear remote stack: {}", e),
                        ),
                        pushed_workout_ids: Vec::new(),
                    })
                }
            }
        }

        let total = queue.len();
        queue.truncate(STACK_CAPACITY);
        let expected = queue.len() as u32;

        let mut warning = (total > STACK_CAPACITY).then(|| {
            format!(
                "{} workouts planned but the stack holds {}; pushed the first {} by sort order",
                total, STACK_CAPACITY, STACK_CAPACITY
            )
        });

        let class_ids: Vec<String> = queue.iter().map(|(_, c)| c.clone()).collect();
        let workout_ids: Vec<String> = queue.iter().map(|(w, _)| w.clone()).collect();

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            // Clear first so a partial prior attempt cannot leave duplicates.
            // A clearing failure indicates a deeper connectivity problem and
            // aborts without backoff.
            if let Err(e) = self.api.modify_stack(access_token, &[]).await {
                if e.is_auth_expired() {
                    return Err(AppError::AuthExpired);
                }
                return Ok(SyncOutcome {
                    result: StackSyncResult::failure(
                        expected,
                        format!("failed to clear remote stack: {}", e),
                    ),
                    pushed_workout_ids: Vec::new(),
                });
            }

            match self.populate(access_token, &class_ids).await {
                Ok(response) => {
                    if response.num_classes != expected {
                        tracing::warn!(
                            reported = response.num_classes,
                            expected,
                            "Remote stack count does not match expected count"
                        );
                        warning.get_or_insert_with(|| {
                            format!(
                                "remote stack reports {} classes, expected {}",
                                response.num_classes, expected
                            )
                        });
                    }

                    return Ok(SyncOutcome {
                        result: StackSyncResult {
                            success: true,
                            pushed: response.num_classes,
                            expected,
                            class_ids: response.class_ids,
                            error: warning,
                        },
                        pushed_workout_ids: workout_ids,
                    });
                }
                Err(AppError::AuthExpired) => return Err(AppError::AuthExpired),
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        error = %last_error,
                        "Stack populate failed"
                    );
                    if attempt < self.policy.max_attempts {
                        tokio::time::sleep(self.policy.delay_after(attempt)).await;
                    }
                }
            }
        }

        Ok(SyncOutcome {
            result: StackSyncResult::failure(
                expected,
                format!(
                    "stack sync failed after {} attempts: {}",
                    self.policy.max_attempts, last_error
                ),
            ),
            pushed_workout_ids: Vec::new(),
        })
    }

    /// Add every class in order, stopping at the first failure.
    async fn populate(
        &self,
        access_token: &str,
        class_ids: &[String],
    ) -> Result<crate::services::peloton::StackResponse, AppError> {
        let mut last = None;
        for class_id in class_ids {
            last = Some(self.api.add_class_to_stack(access_token, class_id).await?);
        }
        last.ok_or_else(|| AppError::Internal(anyhow::anyhow!("populate called with empty list")))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SyncService - orchestration with credential lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Shared per-user sync locks type for use in AppState.
pub type SyncLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// High-level sync service.
///
/// Encapsulates credential retrieval and decryption, the refresh-once
/// recovery path for expired sessions, pushed-flag bookkeeping, and the
/// audit log. Per-user locking keeps two synchronizations for the same user
/// from interleaving their clear/add sequences.
#[derive(Clone)]
pub struct SyncService {
    api: Arc<dyn PelotonApi>,
    store: Arc<dyn PlannerStore>,
    cipher: TokenCipher,
    synchronizer: StackSynchronizer,
    refresher: CredentialRefresher,
    walker: FtpHistoryWalker,
    sync_locks: SyncLocks,
}

impl SyncService {
    pub fn new(
        api: Arc<dyn PelotonApi>,
        store: Arc<dyn PlannerStore>,
        cipher: TokenCipher,
        policy: RetryPolicy,
        sync_locks: SyncLocks,
    ) -> Self {
        Self {
            synchronizer: StackSynchronizer::new(Arc::clone(&api), policy),
            refresher: CredentialRefresher::new(
                Arc::clone(&api),
                Arc::clone(&store),
                cipher.clone(),
            ),
            walker: FtpHistoryWalker::new(Arc::clone(&api)),
            api,
            store,
            cipher,
            sync_locks,
        }
    }

    /// Synchronize one user's plan to their remote stack and write one audit
    /// row for the attempt.
    pub async fn sync_user(
        &self,
        user_id: &str,
        trigger: SyncTrigger,
        date: Option<NaiveDate>,
    ) -> Result<StackSyncResult, AppError> {
        let lock = self
            .sync_locks
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        let outcome = self.sync_user_locked(user_id, date).await;

        // One audit row per attempt, success or not. A log write failure is
        // reported but does not mask the sync outcome.
        let log = match &outcome {
            Ok(result) => SyncLog {
                user_id: user_id.to_string(),
                trigger,
                workouts_pushed: result.pushed,
                success: result.success,
                error: result.error.clone(),
                created_at: Utc::now(),
            },
            Err(e) => SyncLog {
                user_id: user_id.to_string(),
                trigger,
                workouts_pushed: 0,
                success: false,
                error: Some(e.to_string()),
                created_at: Utc::now(),
            },
        };
        if let Err(e) = self.store.append_sync_log(&log).await {
            tracing::warn!(user_id, error = %e, "Failed to write sync log");
        }

        outcome
    }

    async fn sync_user_locked(
        &self,
        user_id: &str,
        date: Option<NaiveDate>,
    ) -> Result<StackSyncResult, AppError> {
        let credential = self.require_credential(user_id).await?;
        let access_token = self.cipher.decrypt_token(&credential.access_token_encrypted)?;

        let date = match date {
            Some(d) => d,
            None => {
                let profile = self.store.get_profile(user_id).await?;
                resolve_local_date(
                    profile.as_ref().and_then(|p| p.timezone.as_deref()),
                    Utc::now(),
                )
            }
        };

        let workouts = self.store.planned_workouts(user_id, date).await?;

        let outcome = match self.synchronizer.push_plan(&access_token, &workouts).await {
            Ok(o) => o,
            Err(AppError::AuthExpired) => {
                // Refresh exactly once, then retry the whole synchronization
                let access_token = self.refresh_once(user_id, &credential).await?;
                self.synchronizer.push_plan(&access_token, &workouts).await?
            }
            Err(e) => return Err(e),
        };

        if outcome.result.success && !outcome.pushed_workout_ids.is_empty() {
            if let Err(e) = self
                .store
                .mark_pushed(user_id, &outcome.pushed_workout_ids)
                .await
            {
                tracing::warn!(user_id, error = %e, "Failed to mark workouts as pushed");
            }
        }

        tracing::info!(
            user_id,
            date = %date,
            pushed = outcome.result.pushed,
            expected = outcome.result.expected,
            success = outcome.result.success,
            "Stack sync finished"
        );

        Ok(outcome.result)
    }

    /// Reconstruct a user's FTP history, refreshing the session once if
    /// needed, and cache the results.
    pub async fn ftp_history(
        &self,
        user_id: &str,
        start_workout_id: &str,
    ) -> Result<Vec<crate::models::FtpTestResult>, AppError> {
        let credential = self.require_credential(user_id).await?;
        let access_token = self.cipher.decrypt_token(&credential.access_token_encrypted)?;

        let results = match self.walker.walk(&access_token, start_workout_id).await {
            Ok(r) => r,
            Err(AppError::AuthExpired) => {
                let access_token = self.refresh_once(user_id, &credential).await?;
                self.walker.walk(&access_token, start_workout_id).await?
            }
            Err(e) => return Err(e),
        };

        self.store.save_ftp_results(user_id, &results).await?;
        Ok(results)
    }

    /// Search on-demand rides, refreshing the session once if needed.
    pub async fn search_rides(
        &self,
        user_id: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<PelotonRide>, AppError> {
        let credential = self.require_credential(user_id).await?;
        let access_token = self.cipher.decrypt_token(&credential.access_token_encrypted)?;

        match self.api.search_rides(&access_token, query, limit).await {
            Ok(rides) => Ok(rides),
            Err(AppError::AuthExpired) => {
                let access_token = self.refresh_once(user_id, &credential).await?;
                self.api.search_rides(&access_token, query, limit).await
            }
            Err(e) => Err(e),
        }
    }

    async fn require_credential(&self, user_id: &str) -> Result<crate::models::Credential, AppError> {
        self.store
            .get_credential(user_id)
            .await?
            .ok_or_else(|| AppError::Credential(format!("user {} has no linked account", user_id)))
    }

    /// Run the refresh recovery path once and return the rotated plaintext
    /// access token.
    async fn refresh_once(
        &self,
        user_id: &str,
        credential: &crate::models::Credential,
    ) -> Result<String, AppError> {
        tracing::info!(user_id, "Session expired, refreshing credential");

        let refresh_token = self
            .cipher
            .decrypt_token(&credential.refresh_token_encrypted)?;

        let outcome = self.refresher.refresh(user_id, &refresh_token).await?;
        if !outcome.success {
            return Err(AppError::Credential(
                "session could not be refreshed; the account must be re-linked".to_string(),
            ));
        }

        let rotated = self.require_credential(user_id).await?;
        Ok(self.cipher.decrypt_token(&rotated.access_token_encrypted)?)
    }
}
