// SPDX-License-Identifier: MIT

//! User profile and encrypted Peloton credential models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User profile stored in Firestore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Local user ID (also used as document ID)
    pub user_id: String,
    /// Peloton user ID, set once the account is linked
    pub peloton_user_id: Option<String>,
    /// Peloton username (display only)
    pub peloton_username: Option<String>,
    /// IANA timezone string, e.g. "America/New_York"
    pub timezone: Option<String>,
    /// When user first connected
    pub created_at: String,
}

/// A user's Peloton session credential (encrypted at rest).
///
/// Both token fields hold versioned ciphertext produced by
/// [`TokenCipher`](crate::services::TokenCipher); plaintext is never stored.
/// Legacy rows from before encryption was introduced hold the raw token and
/// are decrypted-through during the migration window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    /// Owning user (also the document ID)
    pub user_id: String,
    /// Encrypted session/access token
    pub access_token_encrypted: String,
    /// Encrypted refresh token
    pub refresh_token_encrypted: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the stored access token has not yet expired.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
