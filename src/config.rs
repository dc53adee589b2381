// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Secrets (encryption key, scheduler trigger secret) are read once at
//! startup and held in memory. A missing or malformed encryption key is a
//! startup failure, never a silent fallback to plaintext storage.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::env;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Peloton REST API base URL
    pub peloton_api_base: String,
    /// Peloton GraphQL gateway URL (stack operations)
    pub peloton_graphql_url: String,
    /// Identity provider refresh-grant endpoint
    pub peloton_auth_url: String,
    /// OAuth client identifier sent with refresh-grant requests
    pub peloton_client_id: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    // --- Secrets ---
    /// 256-bit key for token encryption at rest
    pub token_encryption_key: [u8; 32],
    /// Shared secret the scheduler must present in `x-sync-trigger-secret`
    pub sync_trigger_secret: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            peloton_api_base: env::var("PELOTON_API_BASE")
                .unwrap_or_else(|_| "https://api.onepeloton.com".to_string()),
            peloton_graphql_url: env::var("PELOTON_GRAPHQL_URL").unwrap_or_else(|_| {
                "https://gql-graphql-gateway.prod.k8s.onepeloton.com/graphql".to_string()
            }),
            peloton_auth_url: env::var("PELOTON_AUTH_URL")
                .unwrap_or_else(|_| "https://api.onepeloton.com/auth/refresh_token".to_string()),
            peloton_client_id: env::var("PELOTON_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("PELOTON_CLIENT_ID"))?,
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            token_encryption_key: parse_encryption_key(
                &env::var("TOKEN_ENCRYPTION_KEY")
                    .map_err(|_| ConfigError::Missing("TOKEN_ENCRYPTION_KEY"))?,
            )?,
            sync_trigger_secret: env::var("SYNC_TRIGGER_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("SYNC_TRIGGER_SECRET"))?,
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            peloton_api_base: "http://localhost:9999".to_string(),
            peloton_graphql_url: "http://localhost:9999/graphql".to_string(),
            peloton_auth_url: "http://localhost:9999/auth/refresh_token".to_string(),
            peloton_client_id: "test_client_id".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            token_encryption_key: [7u8; 32],
            sync_trigger_secret: "test_trigger_secret".to_string(),
        }
    }
}

/// Decode and validate the base64-encoded 256-bit encryption key.
fn parse_encryption_key(value: &str) -> Result<[u8; 32], ConfigError> {
    let bytes = BASE64
        .decode(value.trim())
        .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY", "not valid base64"))?;

    bytes
        .try_into()
        .map_err(|_| ConfigError::Invalid("TOKEN_ENCRYPTION_KEY", "must decode to exactly 32 bytes"))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encryption_key_must_be_32_bytes() {
        let ok = BASE64.encode([1u8; 32]);
        assert!(parse_encryption_key(&ok).is_ok());

        let short = BASE64.encode([1u8; 16]);
        assert!(parse_encryption_key(&short).is_err());

        assert!(parse_encryption_key("not base64 at all!!!").is_err());
    }

    #[test]
    fn encryption_key_round_trips_value() {
        let key: Vec<u8> = (0u8..32).collect();
        let parsed = parse_encryption_key(&BASE64.encode(&key)).unwrap();
        assert_eq!(parsed.to_vec(), key);
    }
}
