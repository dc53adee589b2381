// SPDX-License-Identifier: MIT

//! Record store layer.
//!
//! The planner's persistence is a conventional relational/document store
//! consumed through simple keyed reads and writes, so it sits behind the
//! [`PlannerStore`] trait: Firestore in production, an in-memory map for
//! tests and offline development.

pub mod firestore;
pub mod memory;

pub use firestore::FirestoreStore;
pub use memory::MemoryStore;

use crate::error::AppError;
use crate::models::{Credential, FtpTestResult, PlannedWorkout, SyncLog, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const CREDENTIALS: &str = "credentials";
    pub const PLANNED_WORKOUTS: &str = "planned_workouts";
    pub const FTP_RESULTS: &str = "ftp_results";
    /// Append-only sync audit rows
    pub const SYNC_LOGS: &str = "sync_logs";
}

/// Keyed read/write operations the sync core needs from the record store.
#[async_trait]
pub trait PlannerStore: Send + Sync {
    /// Get a user profile by ID.
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError>;

    /// Get a user's encrypted credential.
    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError>;

    /// Store a user's encrypted credential (both token fields rotate together).
    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError>;

    /// IDs of every user whose stored credential has not expired at `now`.
    async fn users_with_valid_credentials(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError>;

    /// Planned workouts for one user and local date, ordered by `sort_order`
    /// ascending.
    async fn planned_workouts(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<PlannedWorkout>, AppError>;

    /// Mark workouts as pushed to the remote stack.
    async fn mark_pushed(&self, user_id: &str, workout_ids: &[String]) -> Result<(), AppError>;

    /// Append one audit row. Rows are never mutated or deleted.
    async fn append_sync_log(&self, log: &SyncLog) -> Result<(), AppError>;

    /// Cache reconstructed FTP test results for a user.
    async fn save_ftp_results(
        &self,
        user_id: &str,
        results: &[FtpTestResult],
    ) -> Result<(), AppError>;
}
