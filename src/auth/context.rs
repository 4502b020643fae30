//! Per-request state threaded through a flow.
//!
//! Every field is a [`Slot`]: it can be written once, and writing the same value
//! again is a no-op, but a different value is an internal error. A terminal stage
//! that finds a slot empty fails instead of guessing a default.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use uuid::Uuid;

use super::{
    error::AuthError,
    session::{IssuedToken, Session},
};
use crate::oauth::ProviderProfile;
use crate::store::{ProfileFields, ProfileUpdate};

#[derive(Clone)]
pub struct Slot<T> {
    name: &'static str,
    value: Option<T>,
}

impl<T> Slot<T> {
    #[must_use]
    pub const fn empty(name: &'static str) -> Self {
        Self { name, value: None }
    }

    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// # Errors
    /// Returns `AuthError::Internal` if no earlier stage populated the slot.
    pub fn require(&self) -> Result<&T, AuthError> {
        self.value
            .as_ref()
            .ok_or_else(|| AuthError::Internal(format!("context field `{}` is not set", self.name)))
    }
}

impl<T: PartialEq> Slot<T> {
    /// # Errors
    /// Returns `AuthError::Internal` if the slot already holds a different value.
    pub fn set(&mut self, value: T) -> Result<(), AuthError> {
        match &self.value {
            None => {
                self.value = Some(value);
                Ok(())
            }
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(AuthError::Internal(format!(
                "context field `{}` was already set to a different value",
                self.name
            ))),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Slot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{value:?}"),
            None => write!(f, "<unset>"),
        }
    }
}

/// Where the request's credentials come from, decided by the first stage.
pub enum Credentials {
    Local {
        username: String,
        password: SecretString,
    },
    Provider {
        code: String,
    },
    Bearer {
        token: String,
    },
}

impl PartialEq for Credentials {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Self::Local { username, password },
                Self::Local {
                    username: other_username,
                    password: other_password,
                },
            ) => username == other_username && password.expose_secret() == other_password.expose_secret(),
            (Self::Provider { code }, Self::Provider { code: other }) => code == other,
            (Self::Bearer { token }, Self::Bearer { token: other }) => token == other,
            _ => false,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local { username, .. } => f
                .debug_struct("Local")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Provider { .. } => f.debug_struct("Provider").finish_non_exhaustive(),
            Self::Bearer { .. } => f.debug_struct("Bearer").finish_non_exhaustive(),
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub credentials: Slot<Credentials>,
    /// Canonical username: from the body for local credentials, the provider login for OAuth.
    pub username: Slot<String>,
    pub profile: Slot<ProfileFields>,
    pub identity_id: Slot<Uuid>,
    pub password_hash: Slot<String>,
    /// Session presented by the caller and verified.
    pub session: Slot<Session>,
    /// Token issued during this request (login, registration, OAuth, or rename).
    pub issued: Slot<IssuedToken>,
    /// Replacement for a presented session that was in its grace window.
    pub renewed: Slot<IssuedToken>,
    pub oauth_profile: Slot<ProviderProfile>,
    pub has_account: Slot<bool>,
    pub settings: Slot<ProfileUpdate>,
    errors: Vec<String>,
}

impl Default for Context {
    fn default() -> Self {
        Self {
            credentials: Slot::empty("credentials"),
            username: Slot::empty("username"),
            profile: Slot::empty("profile"),
            identity_id: Slot::empty("identity_id"),
            password_hash: Slot::empty("password_hash"),
            session: Slot::empty("session"),
            issued: Slot::empty("issued"),
            renewed: Slot::empty("renewed"),
            oauth_profile: Slot::empty("oauth_profile"),
            has_account: Slot::empty("has_account"),
            settings: Slot::empty("settings"),
            errors: Vec::new(),
        }
    }
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a diagnostic for the request log; never sent to the caller.
    pub fn note(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    #[must_use]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `Some(true)` once a lookup found the account, `Some(false)` once it confirmed absence.
    #[must_use]
    pub fn has_account(&self) -> Option<bool> {
        self.has_account.get().copied()
    }
}
