//! Credential store adapter.
//!
//! The store owns username uniqueness. Callers check for an existing username
//! before inserting, but a concurrent writer can still win the race; `insert`
//! reports that as [`InsertOutcome::Conflict`] instead of an error.
//!
//! All methods return `Err` only for transport or backend faults. A confirmed
//! absence is `Ok(None)` / `Ok(0)` / `NotFound`, never an error.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Dashboard refresh interval given to new accounts, in milliseconds.
pub const DEFAULT_REFRESH_RATE_MS: i64 = 60_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub password_hash: String,
    #[serde(flatten)]
    pub profile: ProfileFields,
}

/// Profile and preference fields of an identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProfileFields {
    pub first_name: String,
    pub last_name: String,
    pub dark_mode: bool,
    pub refresh_rate: i64,
}

impl ProfileFields {
    #[must_use]
    pub fn new(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            dark_mode: false,
            refresh_rate: DEFAULT_REFRESH_RATE_MS,
        }
    }
}

/// Partial update applied by the settings flow; `None` leaves a field unchanged.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dark_mode: Option<bool>,
    pub refresh_rate: Option<i64>,
}

impl ProfileUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.dark_mode.is_none()
            && self.refresh_rate.is_none()
    }

    fn apply(&self, identity: &mut Identity) {
        if let Some(username) = &self.username {
            identity.username.clone_from(username);
        }
        if let Some(first_name) = &self.first_name {
            identity.profile.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &self.last_name {
            identity.profile.last_name.clone_from(last_name);
        }
        if let Some(dark_mode) = self.dark_mode {
            identity.profile.dark_mode = dark_mode;
        }
        if let Some(refresh_rate) = self.refresh_rate {
            identity.profile.refresh_rate = refresh_rate;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    /// The new username belongs to another identity.
    Conflict,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>>;

    async fn insert(&self, identity: Identity) -> Result<InsertOutcome>;

    async fn update_fields(&self, id: Uuid, fields: &ProfileUpdate) -> Result<UpdateOutcome>;

    /// Returns the number of identities removed (0 or 1).
    async fn delete_by_username(&self, username: &str) -> Result<u64>;
}
