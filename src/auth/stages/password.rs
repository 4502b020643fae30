use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::auth::{
    context::{Context, Credentials},
    error::AuthError,
    password::PasswordHasher,
    pipeline::{Stage, StageResult, Step},
    types::Inbound,
};

/// Run Argon2 work off the async workers.
pub(crate) async fn blocking<T, F>(work: F) -> Result<T, AuthError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AuthError::Internal(format!("password task failed: {err}")))
}

/// Plaintext the caller proved with, if the credentials carry one.
pub(crate) fn local_password(ctx: &Context) -> Option<String> {
    match ctx.credentials.get() {
        Some(Credentials::Local { password, .. }) => Some(password.expose_secret().to_string()),
        _ => None,
    }
}

/// Hash the credential of an identity about to be created.
///
/// Skipped when a lookup found an existing account. For OAuth accounts the
/// provider account id stands in for the password.
#[derive(Debug, Clone)]
pub struct HashPassword {
    hasher: PasswordHasher,
}

impl HashPassword {
    #[must_use]
    pub fn new(hasher: PasswordHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl Stage for HashPassword {
    fn name(&self) -> &'static str {
        "hash_password"
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        if ctx.has_account() == Some(true) {
            return Ok(Step::Next);
        }

        let plaintext = match ctx.credentials.require()? {
            Credentials::Local { password, .. } => password.expose_secret().to_string(),
            Credentials::Provider { .. } => ctx.oauth_profile.require()?.provider_id.clone(),
            Credentials::Bearer { .. } => {
                return Err(AuthError::Internal(
                    "hash_password needs local or provider credentials".to_string(),
                ))
            }
        };

        let hasher = self.hasher.clone();
        let digest = blocking(move || hasher.hash(&plaintext))
            .await?
            .map_err(|err| AuthError::Internal(format!("{err:#}")))?;
        ctx.password_hash.set(digest)?;

        Ok(Step::Next)
    }
}

/// Check the presented password against the stored digest.
#[derive(Debug, Clone)]
pub struct ComparePassword {
    hasher: PasswordHasher,
}

impl ComparePassword {
    #[must_use]
    pub fn new(hasher: PasswordHasher) -> Self {
        Self { hasher }
    }
}

#[async_trait]
impl Stage for ComparePassword {
    fn name(&self) -> &'static str {
        "compare_password"
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        let digest = ctx.password_hash.require()?.clone();
        let plaintext = local_password(ctx).ok_or_else(|| {
            AuthError::Internal("compare_password needs local credentials".to_string())
        })?;

        let hasher = self.hasher.clone();
        if blocking(move || hasher.compare(&plaintext, &digest)).await? {
            Ok(Step::Next)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }
}
