//! Flow engine.
//!
//! A [`Flow`] is an ordered list of stages. The engine owns the [`Context`] for
//! the duration of one request, runs each stage under its own span, and turns
//! the first response or error into the final [`Reply`]. Stages never write to
//! the transport themselves.

use anyhow::anyhow;
use async_trait::async_trait;
use futures_util::FutureExt;
use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};
use tracing::{debug, debug_span, error, Instrument};

use super::{
    context::Context,
    error::AuthError,
    types::{Inbound, Reply},
};

/// What the engine does after a stage returns successfully.
#[derive(Debug)]
pub enum Step {
    Next,
    Respond(Reply),
}

pub type StageResult = Result<Step, AuthError>;

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    /// Terminal stages always respond on success and must close a flow.
    fn is_terminal(&self) -> bool {
        false
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult;
}

#[derive(Clone)]
pub struct Flow {
    name: &'static str,
    stages: Vec<Arc<dyn Stage>>,
}

impl std::fmt::Debug for Flow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Flow")
            .field("name", &self.name)
            .field("stages", &self.stage_names())
            .finish()
    }
}

impl Flow {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            stages: Vec::new(),
        }
    }

    #[must_use]
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Arc::new(stage));
        self
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// A flow must have stages and end in a terminal one.
    ///
    /// # Errors
    /// Returns an error describing the first problem found.
    pub fn validate(&self) -> anyhow::Result<()> {
        let Some(last) = self.stages.last() else {
            return Err(anyhow!("flow `{}` has no stages", self.name));
        };
        if !last.is_terminal() {
            return Err(anyhow!(
                "flow `{}` ends in non-terminal stage `{}`",
                self.name,
                last.name()
            ));
        }
        if let Some(stage) = self.stages[..self.stages.len() - 1]
            .iter()
            .find(|stage| stage.is_terminal())
        {
            return Err(anyhow!(
                "flow `{}` has terminal stage `{}` before its end",
                self.name,
                stage.name()
            ));
        }
        Ok(())
    }

    /// Run every stage in order against a fresh context.
    pub async fn run(&self, inbound: &Inbound) -> Reply {
        let mut ctx = Context::new();

        for stage in &self.stages {
            let span = debug_span!("stage", flow = self.name, stage = stage.name());
            let outcome = AssertUnwindSafe(stage.run(&mut ctx, inbound))
                .catch_unwind()
                .instrument(span)
                .await;

            let result = match outcome {
                Ok(result) => result,
                Err(_) => {
                    error!(flow = self.name, stage = stage.name(), "stage panicked");
                    Err(AuthError::Internal(format!("stage `{}` panicked", stage.name())))
                }
            };

            match result {
                Ok(Step::Next) => {}
                Ok(Step::Respond(reply)) => {
                    debug!(flow = self.name, stage = stage.name(), status = %reply.status, "responded");
                    return reply;
                }
                Err(err) => {
                    ctx.note(format!("{}: {err}", stage.name()));
                    debug!(flow = self.name, notes = ?ctx.errors(), "flow aborted");
                    return err.into_reply();
                }
            }
        }

        AuthError::Internal(format!("flow `{}` ended without a response", self.name)).into_reply()
    }
}

/// Await an adapter call with an optional deadline.
///
/// Adapter errors and timeouts both become `AuthError::Upstream`, so a broken
/// store is never reported as bad credentials.
///
/// # Errors
/// Returns `AuthError::Upstream` if the call fails or exceeds `timeout`.
pub async fn bounded<T, F>(timeout: Option<Duration>, what: &str, call: F) -> Result<T, AuthError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .map_err(|_| AuthError::Upstream(anyhow!("{what} timed out after {limit:?}")))?,
        None => call.await,
    };
    result.map_err(|err| err.context(format!("{what} failed")).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    struct SetUsername(&'static str);

    #[async_trait]
    impl Stage for SetUsername {
        fn name(&self) -> &'static str {
            "set_username"
        }

        async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
            ctx.username.set(self.0.to_string())?;
            Ok(Step::Next)
        }
    }

    struct EchoUsername;

    #[async_trait]
    impl Stage for EchoUsername {
        fn name(&self) -> &'static str {
            "echo_username"
        }

        fn is_terminal(&self) -> bool {
            true
        }

        async fn run(&self, ctx: &mut Context, _inbound: &Inbound) -> StageResult {
            let username = ctx.username.require()?;
            Ok(Step::Respond(Reply::json(
                StatusCode::OK,
                &json!({ "username": username }),
            )))
        }
    }

    struct Panics;

    #[async_trait]
    impl Stage for Panics {
        fn name(&self) -> &'static str {
            "panics"
        }

        async fn run(&self, _ctx: &mut Context, _inbound: &Inbound) -> StageResult {
            panic!("boom");
        }
    }

    struct Rejects;

    #[async_trait]
    impl Stage for Rejects {
        fn name(&self) -> &'static str {
            "rejects"
        }

        async fn run(&self, _ctx: &mut Context, _inbound: &Inbound) -> StageResult {
            Err(AuthError::InvalidCredentials)
        }
    }

    fn inbound() -> Inbound {
        Inbound::new(Method::GET, "/test")
    }

    #[tokio::test]
    async fn stages_share_context() -> Result<()> {
        let flow = Flow::new("echo").then(SetUsername("alice")).then(EchoUsername);
        flow.validate()?;
        let reply = flow.run(&inbound()).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.body["username"], "alice");
        Ok(())
    }

    #[tokio::test]
    async fn first_error_short_circuits() {
        let flow = Flow::new("reject").then(Rejects).then(Panics).then(EchoUsername);
        let reply = flow.run(&inbound()).await;
        assert_eq!(reply.status, StatusCode::UNAUTHORIZED);
        assert_eq!(reply.body["invalid"], true);
    }

    #[tokio::test]
    async fn panicking_stage_is_internal_error() {
        let flow = Flow::new("panic").then(Panics).then(EchoUsername);
        let reply = flow.run(&inbound()).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(reply.body["message"], "Internal server error");
    }

    #[tokio::test]
    async fn missing_context_field_is_internal_error() {
        let flow = Flow::new("incomplete").then(EchoUsername);
        let reply = flow.run(&inbound()).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn conflicting_context_write_is_internal_error() {
        let flow = Flow::new("conflict")
            .then(SetUsername("alice"))
            .then(SetUsername("bob"))
            .then(EchoUsername);
        let reply = flow.run(&inbound()).await;
        assert_eq!(reply.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn validate_requires_terminal_last_stage() {
        assert!(Flow::new("empty").validate().is_err());
        assert!(Flow::new("open").then(SetUsername("alice")).validate().is_err());
        assert!(Flow::new("early")
            .then(EchoUsername)
            .then(EchoUsername)
            .validate()
            .is_err());
    }

    #[tokio::test]
    async fn bounded_maps_timeout_and_failure_to_upstream() {
        let slow = bounded(Some(Duration::from_millis(10)), "store lookup", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(slow, Err(AuthError::Upstream(_))));

        let failed: Result<(), AuthError> =
            bounded(None, "store lookup", async { Err(anyhow!("connection refused")) }).await;
        assert!(matches!(failed, Err(AuthError::Upstream(_))));

        let ok = bounded(None, "store lookup", async { Ok(7) }).await;
        assert!(matches!(ok, Ok(7)));
    }
}
