//! Request envelope, reply, and JSON bodies for the auth endpoints.

use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, time::Duration};
use uuid::Uuid;

use super::error::AuthError;

/// Header carrying a freshly issued session token.
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// One inbound request as seen by the guard and the pipeline.
#[derive(Debug, Clone)]
pub struct Inbound {
    pub route: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub query: HashMap<String, String>,
    /// Path parameters captured by the guard (`/user/:username`).
    pub params: HashMap<String, String>,
    /// Upper bound for each store/OAuth call made on behalf of this request.
    pub timeout: Option<Duration>,
}

impl Inbound {
    #[must_use]
    pub fn new(method: Method, route: impl Into<String>) -> Self {
        Self {
            route: route.into(),
            method,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            query: HashMap::new(),
            params: HashMap::new(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    #[must_use]
    pub fn with_json(self, value: &Value) -> Self {
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_body(body)
    }

    #[must_use]
    pub fn with_query(mut self, query: HashMap<String, String>) -> Self {
        self.query = query;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set `Authorization: Bearer <token>`.
    #[must_use]
    pub fn with_bearer(mut self, token: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {token}")) {
            self.headers.insert(axum::http::header::AUTHORIZATION, value);
        }
        self
    }

    /// Deserialize the JSON body; an empty body reads as `{}`.
    ///
    /// # Errors
    /// Returns `AuthError::Validation` if the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, AuthError> {
        let bytes: &[u8] = if self.body.iter().all(u8::is_ascii_whitespace) {
            b"{}"
        } else {
            &self.body
        };
        serde_json::from_slice(bytes)
            .map_err(|_| AuthError::Validation("Malformed request body".to_string()))
    }
}

/// Terminal response of the guard or a flow.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    #[must_use]
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: serde_json::to_value(body).unwrap_or(Value::Null),
        }
    }

    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers.extend(headers);
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
        if let Ok(value) = HeaderValue::from_str(value) {
            self.headers.insert(HeaderName::from_static(name), value);
        }
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, self.headers, Json(self.body)).into_response()
    }
}

/// `POST /auth` and `PUT /auth` / `DELETE /user`; profile fields only for register.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// `POST /github`
#[derive(Deserialize, Debug, Default)]
pub struct ProviderCodeRequest {
    pub code: Option<String>,
}

/// `PUT /user`
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct SettingsRequest {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub dark_mode: Option<bool>,
    pub refresh_rate: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub token: String,
    pub issued: i64,
    pub expires: i64,
    pub user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub dark_mode: bool,
    pub refresh_rate: i64,
}
