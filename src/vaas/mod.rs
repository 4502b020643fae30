use anyhow::Result;
use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    routing::{any, get},
    Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{debug_span, info, Span};
use ulid::Ulid;

use crate::auth::Gateway;

pub mod handlers;

/// Application router: `/health` plus the gateway under `/api`.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/api", any(handlers::dispatch))
        .route("/api/*rest", any(handlers::dispatch))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span)),
        )
        .route("/health", get(handlers::health).options(handlers::health))
        .with_state(gateway)
}

/// Serve until ctrl-c.
/// # Errors
/// Returns an error if the listener cannot bind or the server fails.
pub async fn new(port: u16, gateway: Gateway) -> Result<()> {
    let app = router(Arc::new(gateway));

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Gracefully shutdown");
            }
        })
        .await?;

    Ok(())
}

// span
fn make_span(request: &Request<Body>) -> Span {
    let headers = request.headers();
    let method = request.method().as_str();
    let path = request.uri().path();
    let request_id = headers
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    debug_span!("http-request", method, path, request_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{PasswordHasher, Services, SessionCodec};
    use crate::store::MemoryStore;
    use axum::{body::to_bytes, http::StatusCode};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> anyhow::Result<Router> {
        let services = Services {
            store: Arc::new(MemoryStore::new()),
            oauth: None,
            codec: Arc::new(SessionCodec::new(
                &SecretString::from("0123456789abcdef0123456789abcdef".to_string()),
                900,
                5,
            )?),
            hasher: PasswordHasher::with_cost(1024, 1)?,
        };
        let gateway = Gateway::from_services(&services, Duration::from_secs(5))?;
        Ok(router(Arc::new(gateway)))
    }

    #[tokio::test]
    async fn register_over_http() -> anyhow::Result<()> {
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth")
            .header("content-type", "application/json")
            .body(Body::from(
                json!({"username": "alice", "password": "pw1", "firstName": "Alice", "lastName": "A"})
                    .to_string(),
            ))?;

        let response = app()?.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().contains_key("x-auth-token"));
        assert!(response.headers().contains_key("x-request-id"));

        let body: Value = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
        assert!(body["userId"].is_string());
        Ok(())
    }

    #[tokio::test]
    async fn method_not_allowed_over_http() -> anyhow::Result<()> {
        let request = Request::builder()
            .method("PATCH")
            .uri("/api/github?next=/home")
            .body(Body::empty())?;

        let response = app()?.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get("allow").and_then(|v| v.to_str().ok()),
            Some("POST")
        );
        Ok(())
    }

    #[tokio::test]
    async fn unknown_api_route_is_not_found() -> anyhow::Result<()> {
        let request = Request::builder().uri("/api/cluster").body(Body::empty())?;
        let response = app()?.oneshot(request).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        Ok(())
    }
}
