use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;

use super::{
    credentials::{normalize_username, required},
    session::with_renewal,
};
use crate::auth::{
    context::Context,
    error::AuthError,
    pipeline::{bounded, Stage, StageResult, Step},
    session::SessionCodec,
    types::{Inbound, ProfileResponse, Reply, SettingsRequest},
};
use crate::store::{CredentialStore, ProfileUpdate, UpdateOutcome};

/// Parse the settings body; at least one field must be present.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequireSettings;

#[async_trait]
impl Stage for RequireSettings {
    fn name(&self) -> &'static str {
        "require_settings"
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let request: SettingsRequest = inbound.json()?;
        let username = match request.username.as_deref() {
            Some(username) => Some(normalize_username(Some(username))?),
            None => None,
        };
        if request.refresh_rate.is_some_and(|rate| rate <= 0) {
            return Err(AuthError::Validation("refreshRate must be positive".to_string()));
        }

        // Names follow the registration rules when present.
        let first_name = request.first_name.map(|name| required(Some(name))).transpose()?;
        let last_name = request.last_name.map(|name| required(Some(name))).transpose()?;

        let update = ProfileUpdate {
            username,
            first_name,
            last_name,
            dark_mode: request.dark_mode,
            refresh_rate: request.refresh_rate,
        };
        if update.is_empty() {
            return Err(AuthError::Validation(
                "Unable to fulfill request without any settings".to_string(),
            ));
        }

        ctx.settings.set(update)?;
        Ok(Step::Next)
    }
}

/// Apply the settings to the session's own identity.
///
/// A rename issues a token carrying the new username.
pub struct UpdateSettings {
    store: Arc<dyn CredentialStore>,
    codec: Arc<SessionCodec>,
}

impl UpdateSettings {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, codec: Arc<SessionCodec>) -> Self {
        Self { store, codec }
    }
}

#[async_trait]
impl Stage for UpdateSettings {
    fn name(&self) -> &'static str {
        "update_settings"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let session = ctx.session.require()?;
        let subject_id = session.subject_id;
        let current_username = session.username.clone();
        let update = ctx.settings.require()?.clone();

        let outcome = bounded(
            inbound.timeout,
            "identity update",
            self.store.update_fields(subject_id, &update),
        )
        .await?;

        match outcome {
            UpdateOutcome::Updated => {
                if let Some(username) = update.username.filter(|name| *name != current_username) {
                    let issued = self
                        .codec
                        .issue(subject_id, &username)
                        .map_err(|err| AuthError::Internal(format!("{err:#}")))?;
                    ctx.issued.set(issued)?;
                }
                Ok(Step::Respond(with_renewal(
                    ctx,
                    Reply::json(StatusCode::CREATED, &json!({ "success": true })),
                )))
            }
            // The session outlived its identity.
            UpdateOutcome::NotFound => Err(AuthError::SessionInvalid),
            UpdateOutcome::Conflict => {
                Err(AuthError::Conflict(update.username.unwrap_or_default()))
            }
        }
    }
}

/// Public profile of `/user/:username`; never includes the password hash.
pub struct LoadProfile {
    store: Arc<dyn CredentialStore>,
}

impl LoadProfile {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Stage for LoadProfile {
    fn name(&self) -> &'static str {
        "load_profile"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let username = inbound
            .params
            .get("username")
            .map(String::as_str)
            .ok_or_else(|| AuthError::Internal("route has no `username` parameter".to_string()))?;

        let identity = bounded(
            inbound.timeout,
            "identity lookup",
            self.store.find_by_username(username),
        )
        .await?
        .ok_or_else(|| AuthError::UnknownUser(username.to_string()))?;

        let body = ProfileResponse {
            id: identity.id,
            username: identity.username,
            first_name: identity.profile.first_name,
            last_name: identity.profile.last_name,
            dark_mode: identity.profile.dark_mode,
            refresh_rate: identity.profile.refresh_rate,
        };
        Ok(Step::Respond(with_renewal(ctx, Reply::json(StatusCode::OK, &body))))
    }
}
