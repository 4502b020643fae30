//! Error taxonomy for the auth pipeline and its wire representation.

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, header::ALLOW};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

use super::types::Reply;

const INTERNAL_MESSAGE: &str = "Internal server error";
const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";
const INVALID_SESSION_MESSAGE: &str = "Session is invalid or expired";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing or malformed input; the caller can fix it.
    #[error("{0}")]
    Validation(String),

    #[error("User [{0}] already exists")]
    Conflict(String),

    /// Unknown user and wrong password both map here.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("session expired")]
    SessionExpired,

    #[error("session invalid")]
    SessionInvalid,

    #[error("User [{0}] does not exist")]
    UnknownUser(String),

    /// Store or OAuth adapter failure, including timeouts.
    #[error("upstream fault: {0:#}")]
    Upstream(anyhow::Error),

    #[error("method not allowed")]
    MethodNotAllowed { allow: Vec<Method> },

    #[error("route not found")]
    RouteNotFound,

    /// Incomplete context, misconfigured flow, or a stage that panicked.
    #[error("internal: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Upstream(err)
    }
}

/// Body returned for every failed request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ErrorBody {
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid: Option<bool>,
}

impl AuthError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::SessionExpired | Self::SessionInvalid => {
                StatusCode::UNAUTHORIZED
            }
            Self::UnknownUser(_) | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            Self::Upstream(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short label for logs; never sent to the caller.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Conflict(_) => "conflict",
            Self::InvalidCredentials => "invalid_credentials",
            Self::SessionExpired => "session_expired",
            Self::SessionInvalid => "session_invalid",
            Self::UnknownUser(_) => "unknown_user",
            Self::Upstream(_) => "upstream_fault",
            Self::MethodNotAllowed { .. } => "method_not_allowed",
            Self::RouteNotFound => "route_not_found",
            Self::Internal(_) => "internal",
        }
    }

    #[must_use]
    pub fn body(&self) -> ErrorBody {
        let status = self.status().as_u16();
        let (message, exists, invalid) = match self {
            Self::Validation(message) => (message.clone(), None, None),
            Self::Conflict(_) => (self.to_string(), Some(true), None),
            Self::InvalidCredentials => (INVALID_CREDENTIALS_MESSAGE.to_string(), None, Some(true)),
            // Expired and tampered sessions look the same from outside.
            Self::SessionExpired | Self::SessionInvalid => {
                (INVALID_SESSION_MESSAGE.to_string(), None, Some(true))
            }
            Self::UnknownUser(_) => (self.to_string(), Some(false), None),
            Self::MethodNotAllowed { .. } => (
                "This type of method is not supported by this endpoint".to_string(),
                None,
                None,
            ),
            Self::RouteNotFound => ("Route not found".to_string(), None, None),
            Self::Upstream(_) | Self::Internal(_) => (INTERNAL_MESSAGE.to_string(), None, None),
        };
        ErrorBody {
            status,
            message,
            exists,
            invalid,
        }
    }

    /// Log the error once and convert it into the wire response.
    #[must_use]
    pub fn into_reply(self) -> Reply {
        match &self {
            Self::Upstream(_) | Self::Internal(_) => error!(kind = self.kind(), "{self}"),
            _ => info!(kind = self.kind(), "request rejected"),
        }

        let mut headers = HeaderMap::new();
        if let Self::MethodNotAllowed { allow } = &self {
            let allow = allow
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            if let Ok(value) = HeaderValue::from_str(&allow) {
                headers.insert(ALLOW, value);
            }
        }

        let body = self.body();
        Reply::json(self.status(), &body).with_headers(headers)
    }
}
