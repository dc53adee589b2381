// SPDX-License-Identifier: MIT

//! AES-256-GCM encryption for Peloton tokens at rest.
//!
//! Ciphertext format is a four-field, dot-delimited, versioned string:
//!
//! ```text
//! v1.<base64 nonce>.<base64 ciphertext>.<base64 tag>
//! ```
//!
//! The version tag allows key rotation without breaking stored rows. Values
//! without a recognized version prefix are legacy plaintext from before
//! encryption was introduced; [`TokenCipher::decrypt_token`] passes them
//! through unchanged during the migration window.

use crate::error::AppError;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::{aead::Aead, Aes256Gcm, KeyInit};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;

/// Ciphertext version prefix for the current key/format.
const VERSION_PREFIX: &str = "v1";
/// AES-GCM standard nonce length (96 bits).
const NONCE_LEN: usize = 12;
/// AES-GCM authentication tag length (128 bits).
const TAG_LEN: usize = 16;

/// Cipher failure taxonomy.
///
/// `InvalidKey` is a configuration problem (operators must act);
/// `Malformed`/`Verification` are per-token problems (the affected user must
/// re-link their account).
#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("encryption key must be exactly 32 bytes, got {0}")]
    InvalidKey(usize),

    #[error("malformed ciphertext: {0}")]
    Malformed(&'static str),

    #[error("ciphertext verification failed (tampered or wrong key)")]
    Verification,
}

impl From<CipherError> for AppError {
    fn from(err: CipherError) -> Self {
        match err {
            CipherError::InvalidKey(_) => AppError::Config(err.to_string()),
            CipherError::Malformed(_) | CipherError::Verification => {
                AppError::Credential(err.to_string())
            }
        }
    }
}

/// Symmetric token cipher keyed by a single 256-bit key.
///
/// The key is an explicit constructor dependency so tests can supply
/// alternate keys and rotation stays a config change.
#[derive(Clone)]
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// Create a cipher from a 256-bit key.
    pub fn new(key: &[u8]) -> Result<Self, CipherError> {
        if key.len() != 32 {
            return Err(CipherError::InvalidKey(key.len()));
        }
        Ok(Self {
            cipher: Aes256Gcm::new(GenericArray::from_slice(key)),
        })
    }

    /// Encrypt a token, producing versioned dot-delimited ciphertext.
    ///
    /// A fresh random nonce is generated per call, so encrypting the same
    /// plaintext twice yields different ciphertexts.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CipherError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = GenericArray::from_slice(&nonce_bytes);

        // aes-gcm appends the 16-byte tag to the ciphertext
        let sealed = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|_| CipherError::Verification)?;

        let (body, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}.{}.{}.{}",
            VERSION_PREFIX,
            BASE64.encode(nonce_bytes),
            BASE64.encode(body),
            BASE64.encode(tag)
        ))
    }

    /// Decrypt versioned ciphertext, verifying the authentication tag.
    ///
    /// Any tampering, truncation, or wrong-key attempt fails closed.
    pub fn decrypt(&self, ciphertext: &str) -> Result<String, CipherError> {
        let mut parts = ciphertext.split('.');
        let version = parts.next().unwrap_or_default();
        if version != VERSION_PREFIX {
            return Err(CipherError::Malformed("unknown version tag"));
        }

        let nonce_b64 = parts.next().ok_or(CipherError::Malformed("missing nonce"))?;
        let body_b64 = parts
            .next()
            .ok_or(CipherError::Malformed("missing ciphertext"))?;
        let tag_b64 = parts.next().ok_or(CipherError::Malformed("missing tag"))?;
        if parts.next().is_some() {
            return Err(CipherError::Malformed("too many fields"));
        }

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .map_err(|_| CipherError::Malformed("nonce is not valid base64"))?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(CipherError::Malformed("nonce has wrong length"));
        }

        let mut sealed = BASE64
            .decode(body_b64)
            .map_err(|_| CipherError::Malformed("ciphertext is not valid base64"))?;
        let tag = BASE64
            .decode(tag_b64)
            .map_err(|_| CipherError::Malformed("tag is not valid base64"))?;
        if tag.len() != TAG_LEN {
            return Err(CipherError::Malformed("tag has wrong length"));
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .cipher
            .decrypt(GenericArray::from_slice(&nonce_bytes), sealed.as_slice())
            .map_err(|_| CipherError::Verification)?;

        String::from_utf8(plaintext).map_err(|_| CipherError::Malformed("plaintext is not UTF-8"))
    }

    /// Decrypt a stored token, passing legacy unversioned values through.
    ///
    /// Rows written before encryption was introduced hold the raw token with
    /// no version prefix; those are returned unchanged.
    pub fn decrypt_token(&self, stored: &str) -> Result<String, CipherError> {
        if !is_versioned(stored) {
            return Ok(stored.to_string());
        }
        self.decrypt(stored)
    }
}

/// Whether a stored value carries a recognized ciphertext version prefix.
fn is_versioned(stored: &str) -> bool {
    stored
        .split_once('.')
        .is_some_and(|(version, _)| version == VERSION_PREFIX)
}

/// Helper to encrypt a token pair before storing.
pub fn encrypt_tokens(
    cipher: &TokenCipher,
    access_token: &str,
    refresh_token: &str,
) -> Result<(String, String), CipherError> {
    let encrypted_access = cipher.encrypt(access_token)?;
    let encrypted_refresh = cipher.encrypt(refresh_token)?;
    Ok((encrypted_access, encrypted_refresh))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> TokenCipher {
        TokenCipher::new(&[42u8; 32]).unwrap()
    }

    #[test]
    fn round_trip() {
        let c = cipher();
        for plaintext in ["", "x", "a-session-token", "emoji 🚲 and unicode"] {
            let ct = c.encrypt(plaintext).unwrap();
            assert_eq!(c.decrypt(&ct).unwrap(), plaintext);
        }
    }

    #[test]
    fn encryption_is_not_deterministic() {
        let c = cipher();
        let a = c.encrypt("same-token").unwrap();
        let b = c.encrypt("same-token").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn rejects_wrong_key_length() {
        assert!(matches!(
            TokenCipher::new(&[0u8; 16]),
            Err(CipherError::InvalidKey(16))
        ));
        assert!(matches!(
            TokenCipher::new(&[]),
            Err(CipherError::InvalidKey(0))
        ));
    }

    #[test]
    fn wrong_key_fails_closed() {
        let ct = cipher().encrypt("secret").unwrap();
        let other = TokenCipher::new(&[43u8; 32]).unwrap();
        assert!(matches!(other.decrypt(&ct), Err(CipherError::Verification)));
    }

    #[test]
    fn tampered_payload_or_tag_fails() {
        let c = cipher();
        let ct = c.encrypt("secret-token-value").unwrap();
        let parts: Vec<&str> = ct.split('.').collect();

        // Flip a byte in the ciphertext body
        let mut body = BASE64.decode(parts[2]).unwrap();
        body[0] ^= 0xff;
        let tampered = format!("{}.{}.{}.{}", parts[0], parts[1], BASE64.encode(&body), parts[3]);
        assert!(matches!(c.decrypt(&tampered), Err(CipherError::Verification)));

        // Flip a byte in the tag
        let mut tag = BASE64.decode(parts[3]).unwrap();
        tag[0] ^= 0xff;
        let tampered = format!("{}.{}.{}.{}", parts[0], parts[1], parts[2], BASE64.encode(&tag));
        assert!(matches!(c.decrypt(&tampered), Err(CipherError::Verification)));
    }

    #[test]
    fn truncated_ciphertext_is_malformed() {
        let c = cipher();
        let ct = c.encrypt("secret").unwrap();
        let truncated = ct.rsplit_once('.').unwrap().0;
        assert!(matches!(
            c.decrypt(truncated),
            Err(CipherError::Malformed(_))
        ));
        assert!(matches!(c.decrypt("v1."), Err(CipherError::Malformed(_))));
        assert!(matches!(
            c.decrypt("v2.a.b.c"),
            Err(CipherError::Malformed(_))
        ));
    }

    #[test]
    fn legacy_plaintext_passes_through() {
        let c = cipher();
        // No version prefix at all
        assert_eq!(c.decrypt_token("raw-legacy-token").unwrap(), "raw-legacy-token");
        // Dots but not a recognized version
        assert_eq!(c.decrypt_token("eyJ.hbG.ciO").unwrap(), "eyJ.hbG.ciO");
    }

    #[test]
    fn versioned_token_decrypts_through_passthrough_path() {
        let c = cipher();
        let ct = c.encrypt("modern-token").unwrap();
        assert_eq!(c.decrypt_token(&ct).unwrap(), "modern-token");
    }

    #[test]
    fn encrypt_tokens_pair() {
        let c = cipher();
        let (a, r) = encrypt_tokens(&c, "access", "refresh").unwrap();
        assert_eq!(c.decrypt(&a).unwrap(), "access");
        assert_eq!(c.decrypt(&r).unwrap(), "refresh");
    }
}
