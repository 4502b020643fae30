//! Stateless session tokens.
//!
//! Tokens are HS512-signed JWTs carrying the subject id, username, issue and expiry
//! times. Nothing is stored server-side; validity is decided by the signature and
//! the clock alone.
//!
//! Decoding ignores claims it does not know about, so new claims can be added
//! without invalidating tokens already in circulation.

use anyhow::{anyhow, Context, Result};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Serialize, Deserialize, Debug)]
struct Claims {
    sub: String,
    username: String,
    iat: i64,
    exp: i64,
}

/// Decoded contents of a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub subject_id: Uuid,
    pub username: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// A freshly signed token and the times it was issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub subject_id: Uuid,
    pub username: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Valid(Session),
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiration {
    Active,
    Grace,
    Expired,
}

impl std::fmt::Display for Expiration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Grace => write!(f, "grace"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// `active` before `expires_at`, `grace` for `grace_window` seconds after it,
/// `expired` afterwards.
#[must_use]
pub fn classify_expiration(session: &Session, now: i64, grace_window: i64) -> Expiration {
    if now < session.expires_at {
        Expiration::Active
    } else if now < session.expires_at.saturating_add(grace_window) {
        Expiration::Grace
    } else {
        Expiration::Expired
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

pub struct SessionCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_seconds: i64,
    grace_window_seconds: i64,
}

impl std::fmt::Debug for SessionCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionCodec")
            .field("ttl_seconds", &self.ttl_seconds)
            .field("grace_window_seconds", &self.grace_window_seconds)
            .finish_non_exhaustive()
    }
}

impl SessionCodec {
    /// Build a codec keyed by `secret`.
    ///
    /// # Errors
    /// Returns an error if the secret is shorter than [`MIN_SECRET_LEN`], the TTL is
    /// not positive, or the grace window is negative.
    pub fn new(secret: &SecretString, ttl_seconds: i64, grace_window_seconds: i64) -> Result<Self> {
        let secret = secret.expose_secret().as_bytes();
        if secret.len() < MIN_SECRET_LEN {
            return Err(anyhow!(
                "session secret must be at least {MIN_SECRET_LEN} bytes"
            ));
        }
        if ttl_seconds <= 0 {
            return Err(anyhow!("session TTL must be positive"));
        }
        if grace_window_seconds < 0 {
            return Err(anyhow!("grace window must not be negative"));
        }

        // Expiry is classified by `classify_expiration`, not by the JWT library.
        let mut validation = Validation::new(Algorithm::HS512);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl_seconds,
            grace_window_seconds,
        })
    }

    /// Issue a token valid from now.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue(&self, subject_id: Uuid, username: &str) -> Result<IssuedToken> {
        self.issue_at(subject_id, username, now_unix())
    }

    /// Issue a token as if the current time were `issued_at`.
    ///
    /// # Errors
    /// Returns an error if signing fails.
    pub fn issue_at(&self, subject_id: Uuid, username: &str, issued_at: i64) -> Result<IssuedToken> {
        let expires_at = issued_at.saturating_add(self.ttl_seconds);
        let claims = Claims {
            sub: subject_id.to_string(),
            username: username.to_string(),
            iat: issued_at,
            exp: expires_at,
        };
        let token = encode(&Header::new(Algorithm::HS512), &claims, &self.encoding)
            .context("failed to sign session token")?;

        Ok(IssuedToken {
            token,
            subject_id,
            username: username.to_string(),
            issued_at,
            expires_at,
        })
    }

    /// Check structure and signature. Never fails: anything wrong is `Invalid`.
    #[must_use]
    pub fn verify(&self, token: &str) -> Verification {
        let Ok(data) = decode::<Claims>(token.trim(), &self.decoding, &self.validation) else {
            return Verification::Invalid;
        };
        let claims = data.claims;
        let Ok(subject_id) = Uuid::parse_str(&claims.sub) else {
            return Verification::Invalid;
        };
        if claims.exp <= claims.iat {
            return Verification::Invalid;
        }

        Verification::Valid(Session {
            subject_id,
            username: claims.username,
            issued_at: claims.iat,
            expires_at: claims.exp,
        })
    }

    #[must_use]
    pub fn classify_expiration(&self, session: &Session, now: i64) -> Expiration {
        classify_expiration(session, now, self.grace_window_seconds)
    }
}
