// SPDX-License-Identifier: MIT

//! FTP test history reconstruction.
//!
//! Peloton records each FTP test workout with a pointer back at the previous
//! test, forming a singly-linked backward chain rooted at the most recent
//! test. The walker follows that chain iteratively, one workout fetch (plus
//! one optional performance fetch) per hop, and stops on a null pointer, a
//! cycle, or the hop cap.

use crate::error::AppError;
use crate::models::FtpTestResult;
use crate::services::peloton::PelotonApi;
use std::sync::Arc;

/// Hard cap on chain traversal. Each hop is a remote round-trip, so this
/// also bounds worst-case latency.
const MAX_CHAIN_HOPS: usize = 50;

/// Walks the backward-linked FTP test chain.
#[derive(Clone)]
pub struct FtpHistoryWalker {
    api: Arc<dyn PelotonApi>,
}

impl FtpHistoryWalker {
    pub fn new(api: Arc<dyn PelotonApi>) -> Self {
        Self { api }
    }

    /// Reconstruct the FTP test history starting at `start_workout_id`,
    /// most recent first.
    ///
    /// A failed or missing performance-detail fetch records the result with
    /// no `avg_output` rather than aborting the walk; an expired session
    /// propagates immediately so the caller can refresh.
    pub async fn walk(
        &self,
        access_token: &str,
        start_workout_id: &str,
    ) -> Result<Vec<FtpTestResult>, AppError> {
        let mut results = Vec::new();
        let mut current = start_workout_id.to_string();

        while results.len() < MAX_CHAIN_HOPS {
            let workout = self.api.get_workout(access_token, &current).await?;

            let avg_output = match self.api.get_performance(access_token, &workout.id).await {
                Ok(summary) => summary.avg_output(),
                Err(AppError::AuthExpired) => return Err(AppError::AuthExpired),
                Err(e) => {
                    tracing::warn!(
                        workout_id = %workout.id,
                        error = %e,
                        "Performance detail unavailable, recording test without output"
                    );
                    None
                }
            };

            let (baseline_ftp, source, predecessor) = match &workout.ftp_info {
                Some(info) => (
                    info.ftp.unwrap_or(0),
                    info.ftp_source.clone(),
                    info.ftp_workout_id.clone(),
                ),
                None => (0, None, None),
            };

            results.push(FtpTestResult {
                date: chrono::DateTime::from_timestamp(workout.created_at, 0)
                    .unwrap_or_default()
                    .date_naive(),
                workout_id: workout.id.clone(),
                ride_title: workout
                    .ride
                    .as_ref()
                    .map(|r| r.title.clone())
                    .unwrap_or_default(),
                avg_output,
                calculated_ftp: avg_output.map(FtpTestResult::ftp_from_avg_output),
                baseline_ftp,
                source,
            });

            match predecessor {
                None => break,
                // Self-pointer or a loop back to the walk's root
                Some(next) if next == current || next == start_workout_id => {
                    tracing::warn!(
                        workout_id = %current,
                        "FTP chain cycle detected, stopping walk"
                    );
                    break;
                }
                Some(next) => current = next,
            }
        }

        Ok(results)
    }
}
