use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use super::credentials::valid_username;
use crate::auth::{
    context::{Context, Credentials},
    error::AuthError,
    pipeline::{bounded, Stage, StageResult, Step},
    types::Inbound,
};
use crate::oauth::OAuthExchange;
use crate::store::ProfileFields;

/// Trade the authorization code for a provider profile; the provider login
/// becomes the username.
pub struct ExchangeCode {
    oauth: Option<Arc<dyn OAuthExchange>>,
}

impl ExchangeCode {
    #[must_use]
    pub fn new(oauth: Option<Arc<dyn OAuthExchange>>) -> Self {
        Self { oauth }
    }
}

#[async_trait]
impl Stage for ExchangeCode {
    fn name(&self) -> &'static str {
        "exchange_code"
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let Some(oauth) = &self.oauth else {
            return Err(AuthError::Internal("OAuth provider is not configured".to_string()));
        };
        let Credentials::Provider { code } = ctx.credentials.require()? else {
            return Err(AuthError::Internal(
                "exchange_code needs provider credentials".to_string(),
            ));
        };
        let code = code.clone();

        let token = bounded(inbound.timeout, "oauth code exchange", oauth.exchange_code(&code)).await?;
        let profile = bounded(inbound.timeout, "oauth profile fetch", oauth.fetch_profile(&token)).await?;

        if !valid_username(&profile.login) || profile.provider_id.is_empty() {
            return Err(AuthError::Upstream(anyhow::anyhow!(
                "provider returned an unusable profile"
            )));
        }
        debug!(login = %profile.login, "resolved provider profile");

        ctx.username.set(profile.login.clone())?;
        ctx.oauth_profile.set(profile)?;
        Ok(Step::Next)
    }
}

/// Derive profile fields for a first-time OAuth user. Skipped for existing accounts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynthesizeIdentity;

#[async_trait]
impl Stage for SynthesizeIdentity {
    fn name(&self) -> &'static str {
        "synthesize_identity"
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        match ctx.has_account() {
            Some(true) => Ok(Step::Next),
            Some(false) => {
                let (first_name, last_name) = ctx.oauth_profile.require()?.split_name();
                ctx.profile.set(ProfileFields::new(first_name, last_name))?;
                Ok(Step::Next)
            }
            None => Err(AuthError::Internal(
                "synthesize_identity runs after a lookup".to_string(),
            )),
        }
    }
}
