// SPDX-License-Identifier: MIT

//! Shared test fixtures: a scripted Peloton API mock, an in-memory store,
//! and builders for the records the scenarios need.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use peloplan::db::{MemoryStore, PlannerStore};
use peloplan::error::AppError;
use peloplan::models::{Credential, PlannedWorkout, UserProfile, WorkoutStatus};
use peloplan::services::{
    PelotonApi, RetryPolicy, SyncService, TokenCipher,
};
use peloplan::services::peloton::{
    PelotonRide, PelotonUser, PelotonWorkout, PerformanceSummary, AverageSummary,
    SessionRefreshResponse, StackResponse,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

pub const TEST_KEY: [u8; 32] = [7u8; 32];
pub const ACCESS_TOKEN: &str = "test-access-token";
pub const REFRESH_TOKEN: &str = "test-refresh-token";

/// Deterministic 32-hex class ID for test workout `n`.
pub fn class_id(n: u8) -> String {
    format!("{:032x}", n as u128)
}

pub fn cipher() -> TokenCipher {
    TokenCipher::new(&TEST_KEY).unwrap()
}

/// Calls the mock records, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    GetMe,
    GetWorkout(String),
    GetPerformance(String),
    SearchRides(String),
    ViewStack,
    ModifyStack(Vec<String>),
    AddClass(String),
    RefreshSession,
}

#[derive(Default)]
struct MockState {
    valid_tokens: HashSet<String>,
    workouts: HashMap<String, PelotonWorkout>,
    performances: HashMap<String, f64>,
    failing_performances: HashSet<String>,
    rides: Vec<PelotonRide>,
    refresh_response: Option<SessionRefreshResponse>,
    reject_refresh: bool,
    fail_refresh_transport: bool,
    reject_me: bool,
    fail_next_adds: u32,
    fail_next_clears: u32,
    auth_fail_next_adds: u32,
    stack: Vec<String>,
    calls: Vec<MockCall>,
}

/// Scripted [`PelotonApi`] double.
///
/// Authentication is modeled by a set of accepted access tokens; any call
/// with a token outside the set fails with the expired-session error, which
/// is how the refresh-once recovery paths are exercised.
pub struct MockPelotonApi {
    state: Mutex<MockState>,
}

impl MockPelotonApi {
    pub fn new() -> Arc<Self> {
        let mut state = MockState::default();
        state.valid_tokens.insert(ACCESS_TOKEN.to_string());
        Arc::new(Self {
            state: Mutex::new(state),
        })
    }

    pub fn accept_token(&self, token: &str) {
        self.state.lock().unwrap().valid_tokens.insert(token.to_string());
    }

    pub fn revoke_token(&self, token: &str) {
        self.state.lock().unwrap().valid_tokens.remove(token);
    }

    pub fn add_workout(&self, workout: PelotonWorkout) {
        let mut state = self.state.lock().unwrap();
        state.workouts.insert(workout.id.clone(), workout);
    }

    pub fn set_performance(&self, workout_id: &str, avg_output: f64) {
        let mut state = self.state.lock().unwrap();
        state.performances.insert(workout_id.to_string(), avg_output);
    }

    pub fn fail_performance(&self, workout_id: &str) {
        let mut state = self.state.lock().unwrap();
        state.failing_performances.insert(workout_id.to_string());
    }

    pub fn set_rides(&self, rides: Vec<PelotonRide>) {
        self.state.lock().unwrap().rides = rides;
    }

    /// Fail the next `n` add-class calls with a 500.
    pub fn fail_next_adds(&self, n: u32) {
        self.state.lock().unwrap().fail_next_adds = n;
    }

    /// Fail the next `n` stack-replace calls with a 503.
    pub fn fail_next_clears(&self, n: u32) {
        self.state.lock().unwrap().fail_next_clears = n;
    }

    /// Fail the next `n` add-class calls as an expired session.
    pub fn auth_fail_next_adds(&self, n: u32) {
        self.state.lock().unwrap().auth_fail_next_adds = n;
    }

    /// Script a successful refresh grant. The new access token is accepted
    /// automatically.
    pub fn set_refresh_response(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_in: Option<i64>,
    ) {
        let mut state = self.state.lock().unwrap();
        state.valid_tokens.insert(access_token.to_string());
        state.refresh_response = Some(SessionRefreshResponse {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in,
        });
    }

    /// Script the identity provider rejecting the refresh token.
    pub fn reject_refresh(&self) {
        self.state.lock().unwrap().reject_refresh = true;
    }

    /// Script the refresh-grant endpoint being unreachable.
    pub fn fail_refresh_transport(&self) {
        self.state.lock().unwrap().fail_refresh_transport = true;
    }

    /// Script profile validation rejecting any token.
    pub fn reject_me(&self) {
        self.state.lock().unwrap().reject_me = true;
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Class IDs currently on the simulated remote stack.
    pub fn stack(&self) -> Vec<String> {
        self.state.lock().unwrap().stack.clone()
    }

    pub fn modify_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCall::ModifyStack(_)))
            .count()
    }

    /// Class IDs passed to add-class, in call order.
    pub fn added_classes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCall::AddClass(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn check_token(state: &MockState, token: &str) -> Result<(), AppError> {
        if state.valid_tokens.contains(token) {
            Ok(())
        } else {
            Err(AppError::AuthExpired)
        }
    }
}

#[async_trait]
impl PelotonApi for MockPelotonApi {
    async fn get_me(&self, access_token: &str) -> Result<PelotonUser, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::GetMe);
        Self::check_token(&state, access_token)?;
        if state.reject_me {
            return Err(AppError::Api {
                status: 403,
                message: "forbidden".to_string(),
            });
        }
        Ok(PelotonUser {
            id: "peloton-user-1".to_string(),
            username: "rider".to_string(),
            cycling_ftp: Some(200),
        })
    }

    async fn get_workout(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PelotonWorkout, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::GetWorkout(workout_id.to_string()));
        Self::check_token(&state, access_token)?;
        state
            .workouts
            .get(workout_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("workout {}", workout_id)))
    }

    async fn get_performance(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PerformanceSummary, AppError> {
        let mut state = self.state.lock().unwrap();
        state
            .calls
            .push(MockCall::GetPerformance(workout_id.to_string()));
        Self::check_token(&state, access_token)?;
        if state.failing_performances.contains(workout_id) {
            return Err(AppError::Api {
                status: 500,
                message: "performance graph unavailable".to_string(),
            });
        }
        let summaries = state
            .performances
            .get(workout_id)
            .map(|avg| {
                vec![AverageSummary {
                    slug: "avg_output".to_string(),
                    value: *avg,
                }]
            })
            .unwrap_or_default();
        Ok(PerformanceSummary {
            average_summaries: summaries,
        })
    }

    async fn search_rides(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<PelotonRide>, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::SearchRides(query.to_string()));
        Self::check_token(&state, access_token)?;
        Ok(state.rides.iter().take(limit as usize).cloned().collect())
    }

    async fn view_stack(&self, access_token: &str) -> Result<StackResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::ViewStack);
        Self::check_token(&state, access_token)?;
        Ok(StackResponse {
            num_classes: state.stack.len() as u32,
            class_ids: state.stack.clone(),
        })
    }

    async fn modify_stack(
        &self,
        access_token: &str,
        class_ids: &[String],
    ) -> Result<StackResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::ModifyStack(class_ids.to_vec()));
        Self::check_token(&state, access_token)?;
        if state.fail_next_clears > 0 {
            state.fail_next_clears -= 1;
            return Err(AppError::Api {
                status: 503,
                message: "stack gateway unavailable".to_string(),
            });
        }
        state.stack = class_ids.to_vec();
        Ok(StackResponse {
            num_classes: state.stack.len() as u32,
            class_ids: state.stack.clone(),
        })
    }

    async fn add_class_to_stack(
        &self,
        access_token: &str,
        class_id: &str,
    ) -> Result<StackResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::AddClass(class_id.to_string()));
        Self::check_token(&state, access_token)?;
        if state.auth_fail_next_adds > 0 {
            state.auth_fail_next_adds -= 1;
            return Err(AppError::AuthExpired);
        }
        if state.fail_next_adds > 0 {
            state.fail_next_adds -= 1;
            return Err(AppError::Api {
                status: 500,
                message: "add class failed".to_string(),
            });
        }
        state.stack.push(class_id.to_string());
        Ok(StackResponse {
            num_classes: state.stack.len() as u32,
            class_ids: state.stack.clone(),
        })
    }

    async fn refresh_session(
        &self,
        _refresh_token: &str,
    ) -> Result<SessionRefreshResponse, AppError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(MockCall::RefreshSession);
        if state.fail_refresh_transport {
            return Err(AppError::Transport("connection refused".to_string()));
        }
        if state.reject_refresh {
            return Err(AppError::AuthExpired);
        }
        state.refresh_response.clone().ok_or(AppError::Transport(
            "no refresh response scripted".to_string(),
        ))
    }
}

// ─── Record builders ─────────────────────────────────────────────

/// Credential for `user_id` holding the standard test token pair, encrypted,
/// valid for one hour.
pub fn credential(user_id: &str) -> Credential {
    credential_expiring(user_id, Utc::now() + Duration::hours(1))
}

pub fn credential_expiring(user_id: &str, expires_at: DateTime<Utc>) -> Credential {
    let cipher = cipher();
    Credential {
        user_id: user_id.to_string(),
        access_token_encrypted: cipher.encrypt(ACCESS_TOKEN).unwrap(),
        refresh_token_encrypted: cipher.encrypt(REFRESH_TOKEN).unwrap(),
        expires_at,
    }
}

pub fn profile(user_id: &str, timezone: Option<&str>) -> UserProfile {
    UserProfile {
        user_id: user_id.to_string(),
        peloton_user_id: Some("peloton-user-1".to_string()),
        peloton_username: Some("rider".to_string()),
        timezone: timezone.map(str::to_string),
        created_at: "2026-01-01T00:00:00Z".to_string(),
    }
}

pub fn planned(
    id: &str,
    user_id: &str,
    class_id: Option<String>,
    sort_order: i32,
    date: NaiveDate,
) -> PlannedWorkout {
    PlannedWorkout {
        id: id.to_string(),
        user_id: user_id.to_string(),
        class_id,
        sort_order,
        status: WorkoutStatus::Planned,
        scheduled_date: date,
        title: Some(format!("Ride {}", id)),
        pushed_to_stack: false,
    }
}

/// A remote FTP test workout whose `ftp_workout_id` points at `previous`.
pub fn ftp_workout(id: &str, created_at: i64, baseline: u32, previous: Option<&str>) -> PelotonWorkout {
    PelotonWorkout {
        id: id.to_string(),
        created_at,
        ride: Some(PelotonRide {
            id: class_id(1),
            title: "20 min FTP Test Ride".to_string(),
            duration: Some(1200),
        }),
        ftp_info: Some(peloplan::services::peloton::FtpInfo {
            ftp: Some(baseline),
            ftp_source: Some("ftp_workout_source".to_string()),
            ftp_workout_id: previous.map(str::to_string),
        }),
    }
}

// ─── Service assembly ────────────────────────────────────────────

/// A [`SyncService`] over the mock API and an in-memory store, with a
/// zero-delay three-attempt retry policy.
pub fn sync_service(api: Arc<MockPelotonApi>, store: MemoryStore) -> SyncService {
    let store: Arc<dyn PlannerStore> = Arc::new(store);
    SyncService::new(
        api,
        store,
        cipher(),
        RetryPolicy::immediate(3),
        Arc::new(dashmap::DashMap::new()),
    )
}

pub fn test_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
}
