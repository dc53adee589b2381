// SPDX-License-Identifier: MIT

//! In-memory record store for tests and offline development.

use crate::db::PlannerStore;
use crate::error::AppError;
use crate::models::{Credential, FtpTestResult, PlannedWorkout, SyncLog, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    profiles: HashMap<String, UserProfile>,
    credentials: HashMap<String, Credential>,
    workouts: HashMap<String, PlannedWorkout>,
    ftp_results: HashMap<String, Vec<FtpTestResult>>,
    sync_logs: Vec<SyncLog>,
}

/// In-memory [`PlannerStore`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── Seeding helpers (tests / local dev) ─────────────────────

    pub async fn insert_profile(&self, profile: UserProfile) {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(profile.user_id.clone(), profile);
    }

    pub async fn insert_credential(&self, credential: Credential) {
        let mut inner = self.inner.write().await;
        inner
            .credentials
            .insert(credential.user_id.clone(), credential);
    }

    pub async fn insert_workout(&self, workout: PlannedWorkout) {
        let mut inner = self.inner.write().await;
        inner.workouts.insert(workout.id.clone(), workout);
    }

    // ─── Inspection helpers ──────────────────────────────────────

    pub async fn credential(&self, user_id: &str) -> Option<Credential> {
        self.inner.read().await.credentials.get(user_id).cloned()
    }

    pub async fn workout(&self, workout_id: &str) -> Option<PlannedWorkout> {
        self.inner.read().await.workouts.get(workout_id).cloned()
    }

    pub async fn sync_logs(&self) -> Vec<SyncLog> {
        self.inner.read().await.sync_logs.clone()
    }

    pub async fn ftp_results(&self, user_id: &str) -> Vec<FtpTestResult> {
        self.inner
            .read()
            .await
            .ftp_results
            .get(user_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PlannerStore for MemoryStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        Ok(self.inner.read().await.profiles.get(user_id).cloned())
    }

    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        Ok(self.inner.read().await.credentials.get(user_id).cloned())
    }

    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner
            .credentials
            .insert(credential.user_id.clone(), credential.clone());
        Ok(())
    }

    async fn users_with_valid_credentials(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let inner = self.inner.read().await;
        let mut ids: Vec<String> = inner
            .credentials
            .values()
            .filter(|c| c.is_valid_at(now))
            .map(|c| c.user_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn planned_workouts(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<PlannedWorkout>, AppError> {
        let inner = self.inner.read().await;
        let mut workouts: Vec<PlannedWorkout> = inner
            .workouts
            .values()
            .filter(|w| w.user_id == user_id && w.scheduled_date == date)
            .cloned()
            .collect();
        workouts.sort_by_key(|w| w.sort_order);
        Ok(workouts)
    }

    async fn mark_pushed(&self, user_id: &str, workout_ids: &[String]) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        for id in workout_ids {
            if let Some(workout) = inner.workouts.get_mut(id) {
                if workout.user_id == user_id {
                    workout.pushed_to_stack = true;
                }
            }
        }
        Ok(())
    }

    async fn append_sync_log(&self, log: &SyncLog) -> Result<(), AppError> {
        self.inner.write().await.sync_logs.push(log.clone());
        Ok(())
    }

    async fn save_ftp_results(
        &self,
        user_id: &str,
        results: &[FtpTestResult],
    ) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        inner
            .ftp_results
            .insert(user_id.to_string(), results.to_vec());
        Ok(())
    }
}
