// SPDX-License-Identifier: MIT

//! Planned workout and FTP test result models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a planned workout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutStatus {
    Planned,
    Completed,
    Skipped,
    Postponed,
}

/// A locally planned workout.
///
/// Only `planned` workouts with a remote class ID participate in stack
/// synchronization; stack placement is strictly by `sort_order` ascending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedWorkout {
    /// Document ID
    pub id: String,
    /// Owning user
    pub user_id: String,
    /// Peloton class ID (32 hex chars), None for freeform entries
    pub class_id: Option<String>,
    /// Intra-day position, ascending
    pub sort_order: i32,
    pub status: WorkoutStatus,
    /// Local date the workout is scheduled for
    pub scheduled_date: NaiveDate,
    /// Class title (display only)
    pub title: Option<String>,
    /// Whether this workout was already pushed to the remote stack
    #[serde(default)]
    pub pushed_to_stack: bool,
}

impl PlannedWorkout {
    /// Whether this workout should be pushed to the remote stack.
    pub fn is_stackable(&self) -> bool {
        self.status == WorkoutStatus::Planned && self.class_id.is_some()
    }
}

/// One historical FTP test, reconstructed from the workout chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpTestResult {
    /// Local date the test was taken
    pub date: NaiveDate,
    /// Peloton workout ID of the test
    pub workout_id: String,
    /// Title of the ride taken
    pub ride_title: String,
    /// 20-minute average output in watts, if performance detail was available
    pub avg_output: Option<f64>,
    /// round(avg_output * 0.95), if avg_output was available
    pub calculated_ftp: Option<u32>,
    /// FTP value Peloton had on record at the time of the test
    pub baseline_ftp: u32,
    /// Where the baseline value came from (e.g. "ftp_workout_source")
    pub source: Option<String>,
}

impl FtpTestResult {
    /// Estimate FTP as 95% of the 20-minute average output.
    pub fn ftp_from_avg_output(avg_output: f64) -> u32 {
        (avg_output * 0.95).round() as u32
    }
}
