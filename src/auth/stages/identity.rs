use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::password::{blocking, local_password};
use crate::auth::{
    context::Context,
    error::AuthError,
    password::PasswordHasher,
    pipeline::{bounded, Stage, StageResult, Step},
    types::{Inbound, Reply},
};
use crate::store::{CredentialStore, Identity, InsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Login and delete: an absent account is a credential failure.
    RequireExisting,
    /// Registration: an existing account is a conflict.
    RequireAbsent,
    /// OAuth: either outcome is recorded in `has_account`.
    Either,
}

/// Look the username up and record whether an account exists.
///
/// A store fault is an upstream fault; only a confirmed absence counts as
/// "no account".
pub struct LookupIdentity {
    store: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    mode: Lookup,
}

impl LookupIdentity {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, hasher: PasswordHasher, mode: Lookup) -> Self {
        Self {
            store,
            hasher,
            mode,
        }
    }
}

#[async_trait]
impl Stage for LookupIdentity {
    fn name(&self) -> &'static str {
        match self.mode {
            Lookup::RequireExisting => "lookup_identity_or_invalid",
            Lookup::RequireAbsent => "reject_if_username_taken",
            Lookup::Either => "lookup_by_derived_username",
        }
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let username = ctx.username.require()?.clone();
        let found = bounded(
            inbound.timeout,
            "identity lookup",
            self.store.find_by_username(&username),
        )
        .await?;

        match (found, self.mode) {
            (Some(_), Lookup::RequireAbsent) => Err(AuthError::Conflict(username)),
            (Some(identity), _) => {
                debug!("found identity {}", identity.id);
                ctx.has_account.set(true)?;
                ctx.identity_id.set(identity.id)?;
                ctx.password_hash.set(identity.password_hash)?;
                Ok(Step::Next)
            }
            (None, Lookup::RequireExisting) => {
                // Same work as a real comparison so absence is not observable by timing.
                if let Some(plaintext) = local_password(ctx) {
                    let hasher = self.hasher.clone();
                    blocking(move || hasher.compare_decoy(&plaintext)).await?;
                }
                ctx.note(format!("no identity for [{username}]"));
                Err(AuthError::InvalidCredentials)
            }
            (None, _) => {
                ctx.has_account.set(false)?;
                ctx.identity_id.set(Uuid::now_v7())?;
                Ok(Step::Next)
            }
        }
    }
}

/// Insert the new identity. Skipped for existing accounts.
pub struct PersistIdentity {
    store: Arc<dyn CredentialStore>,
}

impl PersistIdentity {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for PersistIdentity {
    fn name(&self) -> &'static str {
        "persist_identity"
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        if ctx.has_account() == Some(true) {
            return Ok(Step::Next);
        }

        let identity = Identity {
            id: *ctx.identity_id.require()?,
            username: ctx.username.require()?.clone(),
            password_hash: ctx.password_hash.require()?.clone(),
            profile: ctx.profile.require()?.clone(),
        };
        let username = identity.username.clone();

        match bounded(inbound.timeout, "identity insert", self.store.insert(identity)).await? {
            InsertOutcome::Inserted => Ok(Step::Next),
            // Lost a race with a concurrent registration.
            InsertOutcome::Conflict => Err(AuthError::Conflict(username)),
        }
    }
}

/// Remove the verified identity; zero affected rows means it was already gone.
pub struct DeleteIdentity {
    store: Arc<dyn CredentialStore>,
}

impl DeleteIdentity {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for DeleteIdentity {
    fn name(&self) -> &'static str {
        "delete_identity"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let username = ctx.username.require()?.clone();
        let deleted = bounded(
            inbound.timeout,
            "identity delete",
            self.store.delete_by_username(&username),
        )
        .await?;

        if deleted == 0 {
            ctx.note(format!("identity [{username}] vanished before delete"));
            return Err(AuthError::InvalidCredentials);
        }

        Ok(Step::Respond(Reply::json(
            StatusCode::OK,
            &json!({ "deleted": true }),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, ProfileFields};
    use anyhow::Result;
    use axum::http::Method;

    fn inbound() -> Inbound {
        Inbound::new(Method::PUT, "/auth")
    }

    async fn store_with(username: &str) -> Result<Arc<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert(Identity {
                id: Uuid::new_v4(),
                username: username.to_string(),
                password_hash: "hash".to_string(),
                profile: ProfileFields::new("Alice", "A"),
            })
            .await?;
        Ok(store)
    }

    fn context(username: &str) -> Result<Context> {
        let mut ctx = Context::new();
        ctx.username.set(username.to_string())?;
        Ok(ctx)
    }

    #[tokio::test]
    async fn require_absent_rejects_taken_username() -> Result<()> {
        let store = store_with("alice").await?;
        let stage = LookupIdentity::new(store, PasswordHasher::with_cost(1024, 1)?, Lookup::RequireAbsent);
        let result = stage.run(&mut context("alice")?, &inbound()).await;
        assert!(matches!(result, Err(AuthError::Conflict(ref name)) if name == "alice"));
        Ok(())
    }

    #[tokio::test]
    async fn require_existing_populates_identity() -> Result<()> {
        let store = store_with("alice").await?;
        let stage = LookupIdentity::new(store, PasswordHasher::with_cost(1024, 1)?, Lookup::RequireExisting);
        let mut ctx = context("alice")?;
        stage.run(&mut ctx, &inbound()).await?;
        assert_eq!(ctx.has_account(), Some(true));
        assert_eq!(ctx.password_hash.require()?, "hash");
        Ok(())
    }

    #[tokio::test]
    async fn require_existing_absent_is_invalid_credentials() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let stage = LookupIdentity::new(store, PasswordHasher::with_cost(1024, 1)?, Lookup::RequireExisting);
        let result = stage.run(&mut context("ghost")?, &inbound()).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        Ok(())
    }

    #[tokio::test]
    async fn either_records_absence() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let stage = LookupIdentity::new(store, PasswordHasher::with_cost(1024, 1)?, Lookup::Either);
        let mut ctx = context("bob")?;
        stage.run(&mut ctx, &inbound()).await?;
        assert_eq!(ctx.has_account(), Some(false));
        assert!(ctx.identity_id.is_set());
        assert!(!ctx.password_hash.is_set());
        Ok(())
    }

    #[tokio::test]
    async fn persist_reports_race_as_conflict() -> Result<()> {
        let store = store_with("alice").await?;
        let mut ctx = context("alice")?;
        ctx.has_account.set(false)?;
        ctx.identity_id.set(Uuid::new_v4())?;
        ctx.password_hash.set("other".to_string())?;
        ctx.profile.set(ProfileFields::new("Alice", "B"))?;

        let result = PersistIdentity::new(store.clone()).run(&mut ctx, &inbound()).await;
        assert!(matches!(result, Err(AuthError::Conflict(_))));
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn delete_of_vanished_identity_is_invalid() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let result = DeleteIdentity::new(store).run(&mut context("alice")?, &inbound()).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        Ok(())
    }
}
