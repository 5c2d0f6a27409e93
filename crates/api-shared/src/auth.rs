//! Bearer tokens for the REST API.
//!
//! A token is `<payload>.<signature>`: the payload is the base64url (unpadded) JSON of
//! [`Claims`], the signature is base64url HMAC-SHA256 over the encoded payload using the
//! server secret. Access and refresh tokens share the format and differ only by `kind`.

use crate::dto::TokenPair;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use opencare_core::config::parse_env_number;
use opencare_core::RecordId;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const MIN_SECRET_LEN: usize = 32;
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 900;
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 86_400;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("expected a {expected} token")]
    WrongKind { expected: TokenKind },
    #[error("invalid auth configuration: {0}")]
    Config(String),
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Access => f.write_str("access"),
            TokenKind::Refresh => f.write_str("refresh"),
        }
    }
}

/// Token settings, resolved once at startup.
#[derive(Clone)]
pub struct AuthConfig {
    secret: Vec<u8>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("access_ttl_secs", &self.access_ttl_secs)
            .field("refresh_ttl_secs", &self.refresh_ttl_secs)
            .finish()
    }
}

impl AuthConfig {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        access_ttl_secs: i64,
        refresh_ttl_secs: i64,
    ) -> AuthResult<Self> {
        let secret = secret.into();
        if secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::Config(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }
        if access_ttl_secs <= 0 || refresh_ttl_secs <= 0 {
            return Err(AuthError::Config("token lifetimes must be positive".into()));
        }
        Ok(Self {
            secret,
            access_ttl_secs,
            refresh_ttl_secs,
        })
    }

    /// Build from raw environment values.
    ///
    /// `secret` is required; the lifetimes fall back to 15 minutes and one day.
    pub fn from_env_values(
        secret: Option<String>,
        access_ttl_secs: Option<String>,
        refresh_ttl_secs: Option<String>,
    ) -> AuthResult<Self> {
        let secret = secret
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AuthError::Config("OPENCARE_TOKEN_SECRET is not set".into()))?;
        let access = parse_env_number(
            "OPENCARE_ACCESS_TTL_SECS",
            access_ttl_secs,
            DEFAULT_ACCESS_TTL_SECS,
        )
        .map_err(|e| AuthError::Config(e.to_string()))?;
        let refresh = parse_env_number(
            "OPENCARE_REFRESH_TTL_SECS",
            refresh_ttl_secs,
            DEFAULT_REFRESH_TTL_SECS,
        )
        .map_err(|e| AuthError::Config(e.to_string()))?;
        Self::new(secret.into_bytes(), access, refresh)
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_secs
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub kind: TokenKind,
    /// Issued at, Unix seconds
    pub iat: i64,
    /// Expires at, Unix seconds
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn subject(&self) -> AuthResult<RecordId> {
        RecordId::parse(&self.sub).map_err(|_| AuthError::Malformed)
    }
}

#[derive(Clone, Debug)]
pub struct TokenSigner {
    cfg: AuthConfig,
}

impl TokenSigner {
    pub fn new(cfg: AuthConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.cfg
    }

    /// Issue a signed token of `kind` for `subject`.
    pub fn issue(&self, subject: &RecordId, kind: TokenKind, now: DateTime<Utc>) -> AuthResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.cfg.access_ttl_secs,
            TokenKind::Refresh => self.cfg.refresh_ttl_secs,
        };
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        let claims = Claims {
            sub: subject.to_string(),
            kind,
            iat: now.timestamp(),
            exp: now.timestamp() + ttl,
            jti: URL_SAFE_NO_PAD.encode(nonce),
        };
        let json = serde_json::to_vec(&claims).map_err(|_| AuthError::Malformed)?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, signature))
    }

    /// Issue a fresh access and refresh token.
    pub fn issue_pair(&self, subject: &RecordId, now: DateTime<Utc>) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access: self.issue(subject, TokenKind::Access, now)?,
            refresh: Some(self.issue(subject, TokenKind::Refresh, now)?),
            token_type: "Bearer".into(),
            expires_in: self.cfg.access_ttl_secs,
        })
    }

    /// Check the signature, kind and expiry of `token`.
    ///
    /// # Errors
    ///
    /// The signature is checked before the payload is decoded, so a tampered token is always
    /// [`AuthError::BadSignature`] rather than a decode error.
    pub fn verify(&self, token: &str, kind: TokenKind, now: DateTime<Utc>) -> AuthResult<Claims> {
        let (payload, signature) = token.trim().split_once('.').ok_or(AuthError::Malformed)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::Malformed)?;
        self.mac(payload)?
            .verify_slice(&signature)
            .map_err(|_| AuthError::BadSignature)?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&json).map_err(|_| AuthError::Malformed)?;
        if claims.kind != kind {
            return Err(AuthError::WrongKind { expected: kind });
        }
        if now.timestamp() >= claims.exp {
            return Err(AuthError::Expired);
        }
        Ok(claims)
    }

    fn mac(&self, payload: &str) -> AuthResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.cfg.secret)
            .map_err(|e| AuthError::Config(e.to_string()))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}
