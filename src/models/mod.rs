// SPDX-License-Identifier: MIT

//! Data models for the application.

pub mod credential;
pub mod sync;
pub mod workout;

pub use credential::{Credential, UserProfile};
pub use sync::{BatchSummary, StackSyncResult, SyncLog, SyncTrigger};
pub use workout::{FtpTestResult, PlannedWorkout, WorkoutStatus};
