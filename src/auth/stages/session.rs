use async_trait::async_trait;
use axum::http::StatusCode;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

use crate::auth::{
    context::{Context, Credentials},
    error::AuthError,
    pipeline::{bounded, Stage, StageResult, Step},
    session::{now_unix, Expiration, SessionCodec, Verification},
    types::{Inbound, Reply, TokenResponse, AUTH_TOKEN_HEADER},
};
use crate::store::CredentialStore;

/// Sign a session for the identity resolved so far.
pub struct IssueSession {
    codec: Arc<SessionCodec>,
}

impl IssueSession {
    #[must_use]
    pub fn new(codec: Arc<SessionCodec>) -> Self {
        Self { codec }
    }
}

#[async_trait]
impl Stage for IssueSession {
    fn name(&self) -> &'static str {
        "issue_session"
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        let subject_id = *ctx.identity_id.require()?;
        let username = ctx.username.require()?.clone();
        let issued = self
            .codec
            .issue(subject_id, &username)
            .map_err(|err| AuthError::Internal(format!("{err:#}")))?;
        ctx.issued.set(issued)?;
        Ok(Step::Next)
    }
}

/// `201` with the issued token in the body and the `x-auth-token` header.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespondWithToken {
    include_name: bool,
}

impl RespondWithToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also return the username as `name` (OAuth clients display it).
    #[must_use]
    pub fn with_name() -> Self {
        Self { include_name: true }
    }
}

#[async_trait]
impl Stage for RespondWithToken {
    fn name(&self) -> &'static str {
        "respond_with_token"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        let issued = ctx.issued.require()?;
        let body = TokenResponse {
            token: issued.token.clone(),
            issued: issued.issued_at,
            expires: issued.expires_at,
            user_id: issued.subject_id,
            name: self.include_name.then(|| issued.username.clone()),
        };

        Ok(Step::Respond(
            Reply::json(StatusCode::CREATED, &body).with_header(AUTH_TOKEN_HEADER, &issued.token),
        ))
    }
}

/// Verify the bearer token and classify its expiry.
///
/// A token in the grace window is renewed only while its subject still owns
/// the username it was issued for; the old token is left to expire on its own.
pub struct VerifySession {
    codec: Arc<SessionCodec>,
    store: Arc<dyn CredentialStore>,
}

impl VerifySession {
    #[must_use]
    pub fn new(codec: Arc<SessionCodec>, store: Arc<dyn CredentialStore>) -> Self {
        Self { codec, store }
    }
}

#[async_trait]
impl Stage for VerifySession {
    fn name(&self) -> &'static str {
        "verify_session"
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        let Credentials::Bearer { token } = ctx.credentials.require()? else {
            return Err(AuthError::Internal(
                "verify_session needs bearer credentials".to_string(),
            ));
        };

        let Verification::Valid(session) = self.codec.verify(token) else {
            return Err(AuthError::SessionInvalid);
        };

        let expiration = self.codec.classify_expiration(&session, now_unix());
        debug!(subject = %session.subject_id, %expiration, "session verified");

        match expiration {
            Expiration::Active => {}
            Expiration::Grace => {
                let owner = bounded(
                    inbound.timeout,
                    "identity lookup",
                    self.store.find_by_username(&session.username),
                )
                .await?;
                if owner.map(|identity| identity.id) != Some(session.subject_id) {
                    ctx.note(format!(
                        "[{}] no longer belongs to subject {}",
                        session.username, session.subject_id
                    ));
                    return Err(AuthError::SessionInvalid);
                }

                let renewed = self
                    .codec
                    .issue(session.subject_id, &session.username)
                    .map_err(|err| AuthError::Internal(format!("{err:#}")))?;
                ctx.renewed.set(renewed)?;
            }
            Expiration::Expired => return Err(AuthError::SessionExpired),
        }

        ctx.identity_id.set(session.subject_id)?;
        ctx.session.set(session)?;
        Ok(Step::Next)
    }
}

/// Session check response: `200 {"invalid": false}`, plus the renewed token if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct RespondSessionActive;

#[async_trait]
impl Stage for RespondSessionActive {
    fn name(&self) -> &'static str {
        "respond_session_active"
    }

    fn is_terminal(&self) -> bool {
        true
    }

    async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
        ctx.session.require()?;
        Ok(Step::Respond(with_renewal(
            ctx,
            Reply::json(StatusCode::OK, &json!({ "invalid": false })),
        )))
    }
}

/// Attach a token issued or renewed during this request to a successful reply.
/// A freshly issued token wins over a grace renewal.
pub(crate) fn with_renewal(ctx: &Context, reply: Reply) -> Reply {
    match ctx.issued.get().or_else(|| ctx.renewed.get()) {
        Some(fresh) => reply.with_header(AUTH_TOKEN_HEADER, &fresh.token),
        None => reply,
    }
}
