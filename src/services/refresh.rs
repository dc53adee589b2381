// SPDX-License-Identifier: MIT

//! Credential refresh against the Peloton identity provider.
//!
//! Exchanges a refresh token for a new access/refresh pair, validates the
//! new access token with a lightweight profile fetch, then re-encrypts and
//! persists both tokens atomically with the new expiry.

use crate::db::PlannerStore;
use crate::error::AppError;
use crate::models::Credential;
use crate::services::cipher::{encrypt_tokens, TokenCipher};
use crate::services::peloton::PelotonApi;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Access token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// Outcome of one refresh attempt.
///
/// Three classes of failure are distinguished for callers:
/// - transport/provider failure surfaces as `Err` (caller may retry by its
///   own policy)
/// - a rejected or invalid credential returns `Ok` with
///   `needs_reconnect = true` (the user must re-link; never retried)
/// - local encryption/storage failure surfaces as `Err` and must not be
///   treated as a successful refresh
#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub success: bool,
    pub new_expiry: Option<DateTime<Utc>>,
    pub needs_reconnect: bool,
}

impl RefreshOutcome {
    fn reconnect() -> Self {
        Self {
            success: false,
            new_expiry: None,
            needs_reconnect: true,
        }
    }
}

/// Refreshes and re-persists a user's Peloton credential.
#[derive(Clone)]
pub struct CredentialRefresher {
    api: Arc<dyn PelotonApi>,
    store: Arc<dyn PlannerStore>,
    cipher: TokenCipher,
}

impl CredentialRefresher {
    pub fn new(api: Arc<dyn PelotonApi>, store: Arc<dyn PlannerStore>, cipher: TokenCipher) -> Self {
        Self { api, store, cipher }
    }

    /// Exchange `refresh_token` for a new pair and persist it.
    pub async fn refresh(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<RefreshOutcome, AppError> {
        let response = match self.api.refresh_session(refresh_token).await {
            Ok(r) => r,
            // The provider rejected the refresh token itself
            Err(AppError::AuthExpired) => {
                tracing::warn!(user_id, "Refresh token rejected by identity provider");
                return Ok(RefreshOutcome::reconnect());
            }
            Err(AppError::Api { status, message }) if (400..500).contains(&status) => {
                tracing::warn!(user_id, status, error = %message, "Refresh grant rejected");
                return Ok(RefreshOutcome::reconnect());
            }
            Err(e) => return Err(e),
        };

        // Validate the new access token before committing anything. A token
        // the API itself rejects is a hard failure, not a retry candidate.
        match self.api.get_me(&response.access_token).await {
            Ok(_) => {}
            Err(AppError::AuthExpired) | Err(AppError::Api { .. }) => {
                tracing::warn!(user_id, "Refreshed access token failed validation");
                return Ok(RefreshOutcome::reconnect());
            }
            Err(e) => return Err(e),
        }

        // The provider may rotate the refresh token; keep the old one otherwise
        let next_refresh = response.refresh_token.as_deref().unwrap_or(refresh_token);

        let (access_enc, refresh_enc) =
            encrypt_tokens(&self.cipher, &response.access_token, next_refresh)?;

        let lifetime = response.expires_in.unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);
        let expires_at = Utc::now() + Duration::seconds(lifetime);

        self.store
            .set_credential(&Credential {
                user_id: user_id.to_string(),
                access_token_encrypted: access_enc,
                refresh_token_encrypted: refresh_enc,
                expires_at,
            })
            .await?;

        tracing::info!(user_id, expires_at = %expires_at, "Credential refreshed and stored");

        Ok(RefreshOutcome {
            success: true,
            new_expiry: Some(expires_at),
            needs_reconnect: false,
        })
    }
}
