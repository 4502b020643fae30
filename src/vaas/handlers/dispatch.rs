use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
};
use std::{collections::HashMap, sync::Arc};

use crate::auth::{AuthError, Gateway, Inbound, Reply};

/// Prefix the account endpoints are mounted under.
pub const API_PREFIX: &str = "/api";

/// Hand everything under `/api` to the gateway.
pub async fn dispatch(
    State(gateway): State<Arc<Gateway>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let route = match uri.path().strip_prefix(API_PREFIX) {
        Some("") | None => "/",
        Some(rest) => rest,
    };

    let query: HashMap<String, String> = uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let inbound = Inbound::new(method, route)
        .with_headers(headers)
        .with_body(body)
        .with_query(query);

    // Detached so a client disconnect cannot abort a write halfway.
    let handle = tokio::spawn(async move { gateway.handle(inbound).await });
    match handle.await {
        Ok(reply) => reply,
        Err(err) => AuthError::Internal(format!("gateway task failed: {err}")).into_reply(),
    }
}
