// SPDX-License-Identifier: MIT

//! Firestore implementation of the record store.
//!
//! Provides typed operations for:
//! - Users (profile storage, timezone)
//! - Credentials (encrypted Peloton tokens)
//! - Planned workouts (local schedule)
//! - FTP results (cached chain-walk output)
//! - Sync logs (append-only audit rows)

use crate::db::{collections, PlannerStore};
use crate::error::AppError;
use crate::models::{Credential, FtpTestResult, PlannedWorkout, SyncLog, UserProfile};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::{stream, StreamExt};

const MAX_CONCURRENT_DB_OPS: usize = 50;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreStore {
    client: firestore::FirestoreDb,
}

impl FirestoreStore {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self { client })
    }
}

#[async_trait]
impl PlannerStore for FirestoreStore {
    async fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::USERS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn get_credential(&self, user_id: &str) -> Result<Option<Credential>, AppError> {
        self.client
            .fluent()
            .select()
            .by_id_in(collections::CREDENTIALS)
            .obj()
            .one(user_id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set_credential(&self, credential: &Credential) -> Result<(), AppError> {
        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::CREDENTIALS)
            .document_id(&credential.user_id)
            .object(credential)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn users_with_valid_credentials(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, AppError> {
        let credentials: Vec<Credential> = self
            .client
            .fluent()
            .select()
            .from(collections::CREDENTIALS)
            .filter(|q| {
                q.field("expires_at")
                    .greater_than(firestore::FirestoreTimestamp(now))
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(credentials.into_iter().map(|c| c.user_id).collect())
    }

    async fn planned_workouts(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<PlannedWorkout>, AppError> {
        let user_id = user_id.to_string();
        let date = date.to_string();

        self.client
            .fluent()
            .select()
            .from(collections::PLANNED_WORKOUTS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id.clone()),
                    q.field("scheduled_date").eq(date.clone()),
                ])
            })
            .order_by([(
                "sort_order",
                firestore::FirestoreQueryDirection::Ascending,
            )])
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn mark_pushed(&self, user_id: &str, workout_ids: &[String]) -> Result<(), AppError> {
        let client = &self.client;
        let user_id = user_id.to_string();

        stream::iter(workout_ids.to_vec())
            .map(|workout_id| {
                let user_id = user_id.clone();
                async move {
                    let workout: Option<PlannedWorkout> = client
                        .fluent()
                        .select()
                        .by_id_in(collections::PLANNED_WORKOUTS)
                        .obj()
                        .one(&workout_id)
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?;

                    let Some(mut workout) = workout else {
                        tracing::warn!(workout_id = %workout_id, "Workout vanished before pushed-flag update");
                        return Ok(());
                    };
                    if workout.user_id != user_id {
                        return Err(AppError::Database(format!(
                            "workout {} does not belong to user {}",
                            workout_id, user_id
                        )));
                    }

                    workout.pushed_to_stack = true;
                    let _: () = client
                        .fluent()
                        .update()
                        .in_col(collections::PLANNED_WORKOUTS)
                        .document_id(&workout_id)
                        .object(&workout)
                        .execute()
                        .await
                        .map_err(|e| AppError::Database(e.to_string()))?;

                    Ok::<_, AppError>(())
                }
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }

    async fn append_sync_log(&self, log: &SyncLog) -> Result<(), AppError> {
        // Doc ID combines user and millisecond timestamp; rows are append-only
        let doc_id = format!("{}_{}", log.user_id, log.created_at.timestamp_millis());

        let _: () = self
            .client
            .fluent()
            .update()
            .in_col(collections::SYNC_LOGS)
            .document_id(&doc_id)
            .object(log)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn save_ftp_results(
        &self,
        user_id: &str,
        results: &[FtpTestResult],
    ) -> Result<(), AppError> {
        let client = &self.client;

        stream::iter(results.to_vec())
            .map(|result| async move {
                let doc_id = format!("{}_{}", user_id, result.workout_id);

                let _: () = client
                    .fluent()
                    .update()
                    .in_col(collections::FTP_RESULTS)
                    .document_id(&doc_id)
                    .object(&result)
                    .execute()
                    .await
                    .map_err(|e| AppError::Database(e.to_string()))?;

                Ok::<_, AppError>(())
            })
            .buffer_unordered(MAX_CONCURRENT_DB_OPS)
            .collect::<Vec<Result<(), AppError>>>()
            .await
            .into_iter()
            .collect::<Result<Vec<()>, AppError>>()?;

        Ok(())
    }
}
