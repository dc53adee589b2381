// SPDX-License-Identifier: MIT

//! Synchronization result and audit log models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kicked off a synchronization attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncTrigger {
    Manual,
    Scheduled,
}

impl std::fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncTrigger::Manual => write!(f, "manual"),
            SyncTrigger::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Outcome of one stack synchronization.
///
/// `error` may carry a non-fatal warning (truncation, remote count mismatch)
/// even when `success` is true.
#[derive(Debug, Clone, Serialize)]
pub struct StackSyncResult {
    pub success: bool,
    /// Count actually present remotely after the operation
    pub pushed: u32,
    /// Count we intended to push
    pub expected: u32,
    /// Remote confirmation list (raw class IDs)
    pub class_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StackSyncResult {
    pub fn empty_success() -> Self {
        Self {
            success: true,
            pushed: 0,
            expected: 0,
            class_ids: Vec::new(),
            error: None,
        }
    }

    pub fn failure(expected: u32, error: impl Into<String>) -> Self {
        Self {
            success: false,
            pushed: 0,
            expected,
            class_ids: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Append-only audit row, one per synchronization attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncLog {
    pub user_id: String,
    pub trigger: SyncTrigger,
    pub workouts_pushed: u32,
    pub success: bool,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate output of one scheduled batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Users the batch attempted
    pub processed: u32,
    pub succeeded: u32,
    pub failed: u32,
    /// One entry per failed user, `"{user_id}: {error}"`
    pub errors: Vec<String>,
}
