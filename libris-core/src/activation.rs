//! Activation links
//!
//! Signed, purpose-scoped, time-limited tokens embedded in confirmation and
//! login URLs. Token layout:
//!
//! ```text
//! v1.<base64url(claims json)>.<base64url(hmac-sha256("v1." + payload))>
//! ```
//!
//! Verification checks the signature first (constant time), then expiry,
//! then purpose. Callers only ever see one failure message.

use crate::models::EntityKind;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, TimeZone, Utc};
use hmac::{Hmac, Mac};
use libris_common::config::ActivationConfig;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_VERSION: &str = "v1";

/// What a token may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TokenPurpose {
    Login,
    CreateConfirm,
}

impl std::fmt::Display for TokenPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenPurpose::Login => f.write_str("login"),
            TokenPurpose::CreateConfirm => f.write_str("create-confirm"),
        }
    }
}

/// Signed token contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationClaims {
    pub kind: EntityKind,
    pub id: Uuid,
    pub purpose: TokenPurpose,
    /// Expiry, unix seconds
    pub exp: i64,
}

impl ActivationClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }
}

/// A link handed to the submitter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationLink {
    pub url: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Internal reason a token was refused
///
/// Every variant displays the same message; the variant is kept for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("expired or invalid signature")]
    Malformed,
    #[error("expired or invalid signature")]
    BadSignature,
    #[error("expired or invalid signature")]
    Expired,
    #[error("expired or invalid signature")]
    WrongPurpose,
}

/// Issues and verifies activation links
pub struct ActivationTokens {
    secret: Vec<u8>,
    base_url: String,
    login_ttl_secs: u64,
    confirm_ttl_secs: u64,
}

impl ActivationTokens {
    pub fn new(secret: Vec<u8>, config: &ActivationConfig) -> Self {
        Self {
            secret,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            login_ttl_secs: config.login_ttl_secs,
            confirm_ttl_secs: config.confirm_ttl_secs,
        }
    }

    /// Issue a link for `(kind, id)` valid for `ttl_secs` from now
    pub fn issue(&self, kind: EntityKind, id: Uuid, purpose: TokenPurpose, ttl_secs: u64) -> ActivationLink {
        self.issue_at(kind, id, purpose, ttl_secs, libris_common::time::now())
    }

    pub fn issue_at(
        &self,
        kind: EntityKind,
        id: Uuid,
        purpose: TokenPurpose,
        ttl_secs: u64,
        now: DateTime<Utc>,
    ) -> ActivationLink {
        let expires_at = libris_common::time::after_secs(now, ttl_secs);
        let claims = ActivationClaims {
            kind,
            id,
            purpose,
            exp: expires_at.timestamp(),
        };

        let token = self.sign(&claims);
        let url = format!("{}/activate?token={}", self.base_url, token);

        tracing::debug!(
            target_kind = %kind,
            target_id = %id,
            purpose = %purpose,
            expires_at = %expires_at,
            "Issued activation link"
        );

        ActivationLink {
            url,
            token,
            expires_at,
        }
    }

    /// Creation-confirmation link with the configured TTL (24h by default)
    pub fn issue_confirm_link(&self, kind: EntityKind, id: Uuid) -> ActivationLink {
        self.issue(kind, id, TokenPurpose::CreateConfirm, self.confirm_ttl_secs)
    }

    /// Login link for a user with the configured TTL (5 minutes by default)
    pub fn issue_login_link(&self, user_id: Uuid) -> ActivationLink {
        self.issue(EntityKind::User, user_id, TokenPurpose::Login, self.login_ttl_secs)
    }

    /// Verify signature and expiry; any purpose
    pub fn verify(&self, token: &str) -> Result<ActivationClaims, TokenError> {
        self.verify_at(token, libris_common::time::now())
    }

    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<ActivationClaims, TokenError> {
        let token = token.trim();
        let mut parts = token.splitn(3, '.');
        let (version, payload, signature) = match (parts.next(), parts.next(), parts.next()) {
            (Some(v), Some(p), Some(s)) => (v, p, s),
            _ => return Err(self.refuse(TokenError::Malformed)),
        };
        if version != TOKEN_VERSION {
            return Err(self.refuse(TokenError::Malformed));
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| self.refuse(TokenError::Malformed))?;

        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| self.refuse(TokenError::BadSignature))?;
        mac.update(TOKEN_VERSION.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        // Constant-time comparison
        mac.verify_slice(&signature)
            .map_err(|_| self.refuse(TokenError::BadSignature))?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| self.refuse(TokenError::Malformed))?;
        let claims: ActivationClaims =
            serde_json::from_slice(&json).map_err(|_| self.refuse(TokenError::Malformed))?;

        if now.timestamp() >= claims.exp {
            return Err(self.refuse(TokenError::Expired));
        }

        Ok(claims)
    }

    /// Verify and require `purpose`
    pub fn verify_for(&self, token: &str, purpose: TokenPurpose) -> Result<ActivationClaims, TokenError> {
        let claims = self.verify(token)?;
        if claims.purpose != purpose {
            return Err(self.refuse(TokenError::WrongPurpose));
        }
        Ok(claims)
    }

    fn sign(&self, claims: &ActivationClaims) -> String {
        // Claims are plain data; serialization cannot fail
        let json = serde_json::to_vec(claims).unwrap_or_default();
        let payload = URL_SAFE_NO_PAD.encode(json);

        let signature = match HmacSha256::new_from_slice(&self.secret) {
            Ok(mut mac) => {
                mac.update(TOKEN_VERSION.as_bytes());
                mac.update(b".");
                mac.update(payload.as_bytes());
                mac.finalize().into_bytes().to_vec()
            }
            // HMAC accepts keys of any length
            Err(_) => Vec::new(),
        };

        format!("{}.{}.{}", TOKEN_VERSION, payload, URL_SAFE_NO_PAD.encode(signature))
    }

    fn refuse(&self, reason: TokenError) -> TokenError {
        tracing::debug!(reason = ?reason, "Activation token refused");
        reason
    }
}
