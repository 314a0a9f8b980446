// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-service identity encryption and session tokens.
//!
//! External services never see a user's internal id. Each service gets an
//! opaque id that only the hub can reverse:
//!
//! - `enc_{service}_{base64(hex(iv):hex(tag):hex(ciphertext))}` is AES-256-GCM
//!   under a key derived as `SHA256(secret ":" service)`. The IV is random, so
//!   two encryptions of the same id never match.
//! - `hash_{service}_{hex(hmac)}` is a stable, irreversible per-service id.
//! - `session_{service}_{base64(user:service:expires_ms:hex(hmac))}` is a
//!   short-lived signed session token.

use aes_gcm::aead::consts::U16;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::aes::Aes256;
use aes_gcm::{AesGcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// AES-256-GCM with a 128-bit IV.
type Aes256Gcm128 = AesGcm<Aes256, U16>;

const IV_LEN: usize = 16;
const TAG_LEN: usize = 16;

/// Default session token lifetime in seconds.
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;

/// Identity errors. Every variant means "deny".
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Malformed identity value: {0}")]
    InvalidFormat(&'static str),

    #[error("Identity authentication failed")]
    AuthenticationFailed,

    #[error("Session token expired")]
    Expired,

    #[error("Session token signature mismatch")]
    BadSignature,

    #[error("Encryption failed: {0}")]
    Encryption(String),
}

/// Claims carried by a verified session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: String,
    pub service_id: String,
    pub expires_at_ms: i64,
}

/// Per-service identity cipher.
///
/// Cheap to clone; keyed only by the process-lifetime identity secret.
#[derive(Clone)]
pub struct IdentityCipher {
    secret: String,
    mac: HmacSha256,
}

impl IdentityCipher {
    /// Create a cipher from the identity secret.
    pub fn new(secret: &str) -> Result<Self, IdentityError> {
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .map_err(|e| IdentityError::Encryption(e.to_string()))?;
        Ok(Self {
            secret: secret.to_string(),
            mac,
        })
    }

    fn service_cipher(&self, service_id: &str) -> Result<Aes256Gcm128, IdentityError> {
        let key = Sha256::new()
            .chain_update(self.secret.as_bytes())
            .chain_update(b":")
            .chain_update(service_id.as_bytes())
            .finalize();
        Aes256Gcm128::new_from_slice(&key).map_err(|e| IdentityError::Encryption(e.to_string()))
    }

    fn sign_hex(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Encrypt a user id for one service.
    pub fn encrypt_user_id(&self, user_id: &str, service_id: &str) -> Result<String, IdentityError> {
        let cipher = self.service_cipher(service_id)?;

        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        let sealed = cipher
            .encrypt(Nonce::<U16>::from_slice(&iv), user_id.as_bytes())
            .map_err(|e| IdentityError::Encryption(e.to_string()))?;

        // aes-gcm appends the tag to the ciphertext
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);
        let combined = format!(
            "{}:{}:{}",
            hex::encode(iv),
            hex::encode(tag),
            hex::encode(ciphertext)
        );

        Ok(format!("enc_{}_{}", service_id, BASE64.encode(combined)))
    }

    /// Decrypt an id produced by [`encrypt_user_id`](Self::encrypt_user_id)
    /// for the same service.
    pub fn decrypt_user_id(
        &self,
        encrypted_id: &str,
        service_id: &str,
    ) -> Result<String, IdentityError> {
        let prefix = format!("enc_{}_", service_id);
        let encoded = encrypted_id
            .strip_prefix(&prefix)
            .ok_or(IdentityError::InvalidFormat("wrong service prefix"))?;

        let decoded = BASE64
            .decode(encoded)
            .map_err(|_| IdentityError::InvalidFormat("not base64"))?;
        let combined =
            String::from_utf8(decoded).map_err(|_| IdentityError::InvalidFormat("not utf-8"))?;

        let parts: Vec<&str> = combined.split(':').collect();
        let [iv_hex, tag_hex, ct_hex] = parts.as_slice() else {
            return Err(IdentityError::InvalidFormat("expected iv:tag:ciphertext"));
        };

        let iv = hex::decode(iv_hex).map_err(|_| IdentityError::InvalidFormat("bad iv"))?;
        let tag = hex::decode(tag_hex).map_err(|_| IdentityError::InvalidFormat("bad tag"))?;
        let mut sealed =
            hex::decode(ct_hex).map_err(|_| IdentityError::InvalidFormat("bad ciphertext"))?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(IdentityError::InvalidFormat("bad iv or tag length"));
        }
        sealed.extend_from_slice(&tag);

        let plaintext = self
            .service_cipher(service_id)?
            .decrypt(Nonce::<U16>::from_slice(&iv), sealed.as_slice())
            .map_err(|_| IdentityError::AuthenticationFailed)?;

        String::from_utf8(plaintext).map_err(|_| IdentityError::InvalidFormat("not utf-8"))
    }

    /// Stable, irreversible per-service id.
    pub fn hash_user_id(&self, user_id: &str, service_id: &str) -> String {
        let digest = self.sign_hex(&format!("{}:{}", user_id, service_id));
        format!("hash_{}_{}", service_id, digest)
    }

    /// Report whether `encrypted_id` decrypts for `service_id`.
    pub fn is_valid_encrypted_id(&self, encrypted_id: &str, service_id: &str) -> bool {
        self.decrypt_user_id(encrypted_id, service_id).is_ok()
    }

    /// Issue a signed session token valid for `ttl_secs`.
    pub fn generate_session_token(&self, user_id: &str, service_id: &str, ttl_secs: u64) -> String {
        let ttl_ms = i64::try_from(ttl_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
        let expires_at_ms = chrono::Utc::now().timestamp_millis().saturating_add(ttl_ms);
        let payload = format!("{}:{}:{}", user_id, service_id, expires_at_ms);
        let signature = self.sign_hex(&payload);

        format!(
            "session_{}_{}",
            service_id,
            BASE64.encode(format!("{}:{}", payload, signature))
        )
    }

    /// Verify a session token issued for `service_id`.
    pub fn verify_session_token(
        &self,
        token: &str,
        service_id: &str,
    ) -> Result<SessionClaims, IdentityError> {
        self.verify_session_token_at(token, service_id, chrono::Utc::now().timestamp_millis())
    }

    /// Verify a session token against an explicit clock.
    pub fn verify_session_token_at(
        &self,
        token: &str,
        service_id: &str,
        now_ms: i64,
    ) -> Result<SessionClaims, IdentityError> {
        let prefix = format!("session_{}_", service_id);
        let encoded = token
            .strip_prefix(&prefix)
            .ok_or(IdentityError::InvalidFormat("wrong service prefix"))?;

        let decoded = BASE64
            .decode(encoded)
            .map_err(|_| IdentityError::InvalidFormat("not base64"))?;
        let decoded =
            String::from_utf8(decoded).map_err(|_| IdentityError::InvalidFormat("not utf-8"))?;

        let parts: Vec<&str> = decoded.split(':').collect();
        let [user_id, token_service_id, expires_at, signature] = parts.as_slice() else {
            return Err(IdentityError::InvalidFormat(
                "expected user:service:expiry:signature",
            ));
        };

        let expires_at_ms: i64 = expires_at
            .parse()
            .map_err(|_| IdentityError::InvalidFormat("bad expiry"))?;
        if now_ms > expires_at_ms {
            tracing::warn!(service_id, "Expired session token presented");
            return Err(IdentityError::Expired);
        }

        let expected = self.sign_hex(&format!("{}:{}:{}", user_id, token_service_id, expires_at));
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            tracing::warn!(service_id, "Session token signature mismatch");
            return Err(IdentityError::BadSignature);
        }

        if *token_service_id != service_id {
            return Err(IdentityError::InvalidFormat("token issued for another service"));
        }

        Ok(SessionClaims {
            user_id: user_id.to_string(),
            service_id: token_service_id.to_string(),
            expires_at_ms,
        })
    }
}
