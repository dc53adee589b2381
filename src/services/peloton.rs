// SPDX-License-Identifier: MIT

//! Peloton API client.
//!
//! Two remote surfaces sit behind one trait:
//! - the conventional REST API (profile, workout detail, performance
//!   summary, ride search), bearer-token JSON over HTTP
//! - the GraphQL gateway for stack operations (view / replace / add-one)
//!
//! This layer is a single-attempt, fail-fast translator: a 401 becomes the
//! distinguished [`AppError::AuthExpired`], any other non-2xx becomes
//! [`AppError::Api`] with the status code. Retries live in the stack
//! synchronizer, not here.

use crate::error::AppError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Composite class identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Routing metadata the GraphQL gateway expects alongside the raw ride ID.
const CLASS_TYPE_ON_DEMAND: &str = "on_demand";

/// Composite class identifier envelope used by the stack mutations.
#[derive(Debug, Serialize, Deserialize)]
struct ClassIdEnvelope {
    class_id: String,
    class_type: String,
}

/// Validate a raw Peloton class ID: exactly 32 hexadecimal characters.
pub fn validate_class_id(class_id: &str) -> Result<(), AppError> {
    if class_id.len() == 32 && class_id.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "invalid class id {:?}: expected 32 hex characters",
            class_id
        )))
    }
}

/// Encode a raw class ID into the gateway's composite identifier
/// (base64-encoded JSON envelope). Invalid input is rejected before any
/// network call.
pub fn encode_class_id(class_id: &str) -> Result<String, AppError> {
    validate_class_id(class_id)?;
    let envelope = ClassIdEnvelope {
        class_id: class_id.to_string(),
        class_type: CLASS_TYPE_ON_DEMAND.to_string(),
    };
    let json = serde_json::to_vec(&envelope)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("envelope encode failed: {}", e)))?;
    Ok(BASE64.encode(json))
}

/// Decode a composite identifier back to the raw 32-hex class ID.
pub fn decode_class_id(composite: &str) -> Result<String, AppError> {
    let json = BASE64
        .decode(composite)
        .map_err(|_| AppError::Api {
            status: 200,
            message: "stack response contained a non-base64 class id".to_string(),
        })?;
    let envelope: ClassIdEnvelope = serde_json::from_slice(&json).map_err(|_| AppError::Api {
        status: 200,
        message: "stack response contained a malformed class id envelope".to_string(),
    })?;
    validate_class_id(&envelope.class_id)?;
    Ok(envelope.class_id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Response types
// ─────────────────────────────────────────────────────────────────────────────

/// Authenticated user profile from `/api/me`.
#[derive(Debug, Clone, Deserialize)]
pub struct PelotonUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub cycling_ftp: Option<u32>,
}

/// Workout detail from `/api/workout/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct PelotonWorkout {
    pub id: String,
    /// Unix timestamp of the workout start
    pub created_at: i64,
    #[serde(default)]
    pub ride: Option<PelotonRide>,
    #[serde(default)]
    pub ftp_info: Option<FtpInfo>,
}

/// Ride (class) detail embedded in a workout or returned by search.
#[derive(Debug, Clone, Deserialize)]
pub struct PelotonRide {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub duration: Option<u32>,
}

/// FTP metadata attached to a workout.
///
/// `ftp_workout_id` points backward at the previous FTP test, forming the
/// singly-linked chain the history walker follows.
#[derive(Debug, Clone, Deserialize)]
pub struct FtpInfo {
    #[serde(default)]
    pub ftp: Option<u32>,
    #[serde(default)]
    pub ftp_source: Option<String>,
    #[serde(default)]
    pub ftp_workout_id: Option<String>,
}

/// Performance summary from `/api/workout/{id}/performance_graph`.
#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceSummary {
    #[serde(default)]
    pub average_summaries: Vec<AverageSummary>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AverageSummary {
    pub slug: String,
    pub value: f64,
}

impl PerformanceSummary {
    /// Average output in watts, if the ride reported one.
    pub fn avg_output(&self) -> Option<f64> {
        self.average_summaries
            .iter()
            .find(|s| s.slug == "avg_output")
            .map(|s| s.value)
    }
}

/// Ride search response envelope from `/api/ride/search`.
#[derive(Debug, Clone, Deserialize)]
struct RideSearchResponse {
    #[serde(default)]
    data: Vec<PelotonRide>,
}

/// Refresh-grant response from the identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionRefreshResponse {
    pub access_token: String,
    /// The provider may rotate the refresh token; absent means keep the old one
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds; absent means use the default
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Decoded result of a stack query or mutation.
#[derive(Debug, Clone)]
pub struct StackResponse {
    /// Remote class count after the operation
    pub num_classes: u32,
    /// Raw class IDs currently on the stack, in order
    pub class_ids: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Typed access to the Peloton REST and GraphQL surfaces.
///
/// Every method is one attempt against the remote; callers own retry policy.
/// All implementations must be `Send + Sync` for use across async tasks.
#[async_trait]
pub trait PelotonApi: Send + Sync {
    /// Get the authenticated user's profile (`/api/me`).
    async fn get_me(&self, access_token: &str) -> Result<PelotonUser, AppError>;

    /// Get a workout with its ride and FTP metadata.
    async fn get_workout(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PelotonWorkout, AppError>;

    /// Get the performance summary for a workout.
    async fn get_performance(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PerformanceSummary, AppError>;

    /// Search on-demand rides by title.
    async fn search_rides(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<PelotonRide>, AppError>;

    /// View the current remote stack.
    async fn view_stack(&self, access_token: &str) -> Result<StackResponse, AppError>;

    /// Replace the entire remote stack with the given class IDs
    /// (an empty slice clears it).
    async fn modify_stack(
        &self,
        access_token: &str,
        class_ids: &[String],
    ) -> Result<StackResponse, AppError>;

    /// Add one class to the end of the remote stack.
    async fn add_class_to_stack(
        &self,
        access_token: &str,
        class_id: &str,
    ) -> Result<StackResponse, AppError>;

    /// Exchange a refresh token for a new access/refresh pair.
    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<SessionRefreshResponse, AppError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// reqwest implementation
// ─────────────────────────────────────────────────────────────────────────────

/// GraphQL documents for the stack operations. Only the fields we verify
/// against are selected; this is deliberately not a general GraphQL client.
const VIEW_STACK_QUERY: &str = "query ViewUserStack { viewUserStack { numClasses stackedClasses { pelotonClassId } } }";
const MODIFY_STACK_QUERY: &str = "mutation ModifyStack($input: ModifyStackInput!) { modifyStack(input: $input) { numClasses stackedClasses { pelotonClassId } } }";
const ADD_CLASS_QUERY: &str = "mutation AddClassToStack($input: AddClassToStackInput!) { addClassToStack(input: $input) { numClasses stackedClasses { pelotonClassId } } }";

/// Peloton API client over reqwest.
#[derive(Clone)]
pub struct PelotonClient {
    http: reqwest::Client,
    api_base: String,
    graphql_url: String,
    auth_url: String,
    client_id: String,
}

/// Per-request deadline. Bounds worst-case latency of a chain walk or retry
/// sequence, since every hop is one request.
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

impl PelotonClient {
    pub fn new(
        api_base: String,
        graphql_url: String,
        auth_url: String,
        client_id: String,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base,
            graphql_url,
            auth_url,
            client_id,
        }
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::new(
            config.peloton_api_base.clone(),
            config.peloton_graphql_url.clone(),
            config.peloton_auth_url.clone(),
            config.peloton_client_id.clone(),
        )
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        access_token: &str,
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        check_response_json(response).await
    }

    /// Execute one GraphQL operation against the stack gateway.
    async fn graphql<T: for<'de> Deserialize<'de>>(
        &self,
        access_token: &str,
        operation_name: &str,
        query: &str,
        variables: serde_json::Value,
    ) -> Result<T, AppError> {
        let body = serde_json::json!({
            "operationName": operation_name,
            "query": query,
            "variables": variables,
        });

        let response = self
            .http
            .post(&self.graphql_url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let envelope: GraphqlEnvelope<T> = check_response_json(response).await?;

        if let Some(errors) = envelope.errors {
            if let Some(first) = errors.first() {
                return Err(AppError::Api {
                    status: 200,
                    message: format!("GraphQL error in {}: {}", operation_name, first.message),
                });
            }
        }

        envelope.data.ok_or_else(|| AppError::Api {
            status: 200,
            message: format!("GraphQL response for {} had no data", operation_name),
        })
    }
}

#[async_trait]
impl PelotonApi for PelotonClient {
    async fn get_me(&self, access_token: &str) -> Result<PelotonUser, AppError> {
        let url = format!("{}/api/me", self.api_base);
        self.get_json(&url, access_token).await
    }

    async fn get_workout(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PelotonWorkout, AppError> {
        let url = format!("{}/api/workout/{}", self.api_base, workout_id);
        self.get_json(&url, access_token).await
    }

    async fn get_performance(
        &self,
        access_token: &str,
        workout_id: &str,
    ) -> Result<PerformanceSummary, AppError> {
        let url = format!(
            "{}/api/workout/{}/performance_graph?every_n=1000",
            self.api_base, workout_id
        );
        self.get_json(&url, access_token).await
    }

    async fn search_rides(
        &self,
        access_token: &str,
        query: &str,
        limit: u32,
    ) -> Result<Vec<PelotonRide>, AppError> {
        let response = self
            .http
            .get(format!("{}/api/ride/search", self.api_base))
            .bearer_auth(access_token)
            .query(&[("query", query), ("limit", &limit.to_string())])
            .send()
            .await
            .map_err(|e| AppError::Transport(e.to_string()))?;

        let parsed: RideSearchResponse = check_response_json(response).await?;
        Ok(parsed.data)
    }

    async fn view_stack(&self, access_token: &str) -> Result<StackResponse, AppError> {
        let data: ViewStackData = self
            .graphql(
                access_token,
                "ViewUserStack",
                VIEW_STACK_QUERY,
                serde_json::json!({}),
            )
            .await?;
        data.view_user_stack.decode()
    }

    async fn modify_stack(
        &self,
        access_token: &str,
        class_ids: &[String],
    ) -> Result<StackResponse, AppError> {
        // Validate and encode every id before touching the network
        let composite: Vec<String> = class_ids
            .iter()
            .map(|id| encode_class_id(id))
            .collect::<Result<_, _>>()?;

        let data: ModifyStackData = self
            .graphql(
                access_token,
                "ModifyStack",
                MODIFY_STACK_QUERY,
                serde_json::json!({ "input": { "pelotonClassIdList": composite } }),
            )
            .await?;
        data.modify_stack.decode()
    }

    async fn add_class_to_stack(
        &self,
        access_token: &str,
        class_id: &str,
    ) -> Result<StackResponse, AppError> {
        let composite = encode_class_id(class_id)?;

        let data: AddClassData = self
            .graphql(
                access_token,
                "AddClassToStack",
                ADD_CLASS_QUERY,
                serde_json::json!({ "input": { "pelotonClassId": composite } }),
            )
            .await?;
        data.add_class_to_stack.decode()
    }

    async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<SessionRefreshResponse, AppError> {
        let response = self
            .http
            .post(&self.auth_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("token refresh request failed: {}", e)))?;

        check_response_json(response).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire shapes and status translation
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct GraphqlEnvelope<T> {
    data: Option<T>,
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize)]
struct ViewStackData {
    #[serde(rename = "viewUserStack")]
    view_user_stack: StackPayload,
}

#[derive(Deserialize)]
struct ModifyStackData {
    #[serde(rename = "modifyStack")]
    modify_stack: StackPayload,
}

#[derive(Deserialize)]
struct AddClassData {
    #[serde(rename = "addClassToStack")]
    add_class_to_stack: StackPayload,
}

#[derive(Deserialize)]
struct StackPayload {
    #[serde(rename = "numClasses")]
    num_classes: u32,
    #[serde(rename = "stackedClasses", default)]
    stacked_classes: Vec<StackedClass>,
}

#[derive(Deserialize)]
struct StackedClass {
    #[serde(rename = "pelotonClassId")]
    peloton_class_id: String,
}

impl StackPayload {
    /// Decode the composite identifiers back to raw class IDs.
    fn decode(self) -> Result<StackResponse, AppError> {
        let class_ids = self
            .stacked_classes
            .iter()
            .map(|c| decode_class_id(&c.peloton_class_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(StackResponse {
            num_classes: self.num_classes,
            class_ids,
        })
    }
}

/// Check response status, translating 401 into the distinguished
/// authentication-expired failure, then parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        if status == 401 {
            return Err(AppError::AuthExpired);
        }

        return Err(AppError::Api {
            status,
            message: body,
        });
    }

    response
        .json()
        .await
        .map_err(|e| AppError::Api {
            status: 200,
            message: format!("JSON parse error: {}", e),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_ID: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn class_id_validation() {
        assert!(validate_class_id(VALID_ID).is_ok());
        assert!(validate_class_id(&VALID_ID.to_uppercase()).is_ok());

        assert!(validate_class_id("").is_err());
        assert!(validate_class_id("0123456789abcdef").is_err()); // too short
        assert!(validate_class_id(&format!("{}0", VALID_ID)).is_err()); // too long
        assert!(validate_class_id("0123456789abcdefg123456789abcdef").is_err()); // non-hex
    }

    #[test]
    fn composite_id_round_trip() {
        let composite = encode_class_id(VALID_ID).unwrap();
        assert_ne!(composite, VALID_ID);
        assert_eq!(decode_class_id(&composite).unwrap(), VALID_ID);
    }

    #[test]
    fn composite_id_is_json_envelope() {
        let composite = encode_class_id(VALID_ID).unwrap();
        let json = BASE64.decode(&composite).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&json).unwrap();
        assert_eq!(value["class_id"], VALID_ID);
        assert_eq!(value["class_type"], CLASS_TYPE_ON_DEMAND);
    }

    #[test]
    fn invalid_id_rejected_before_encoding() {
        assert!(encode_class_id("not-a-class-id").is_err());
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_class_id("!!!not-base64!!!").is_err());
        assert!(decode_class_id(&BASE64.encode(b"{\"wrong\":\"shape\"}")).is_err());
    }

    #[test]
    fn avg_output_extracted_by_slug() {
        let summary = PerformanceSummary {
            average_summaries: vec![
                AverageSummary {
                    slug: "avg_cadence".to_string(),
                    value: 85.0,
                },
                AverageSummary {
                    slug: "avg_output".to_string(),
                    value: 212.5,
                },
            ],
        };
        assert_eq!(summary.avg_output(), Some(212.5));

        let empty = PerformanceSummary {
            average_summaries: vec![],
        };
        assert_eq!(empty.avg_output(), None);
    }

    #[test]
    fn stack_payload_decodes_composite_ids() {
        let payload = StackPayload {
            num_classes: 1,
            stacked_classes: vec![StackedClass {
                peloton_class_id: encode_class_id(VALID_ID).unwrap(),
            }],
        };
        let response = payload.decode().unwrap();
        assert_eq!(response.num_classes, 1);
        assert_eq!(response.class_ids, vec![VALID_ID.to_string()]);
    }
}
