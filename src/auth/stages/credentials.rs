use async_trait::async_trait;
use axum::http::header::AUTHORIZATION;
use regex::Regex;
use secrecy::SecretString;

use crate::auth::{
    context::{Context, Credentials},
    error::AuthError,
    pipeline::{Stage, StageResult, Step},
    types::{CredentialsRequest, Inbound, ProviderCodeRequest},
};
use crate::store::ProfileFields;

const MISSING_FIELDS: &str = "Unable to fulfill request without all fields completed";

#[must_use]
pub fn valid_username(username: &str) -> bool {
    Regex::new(r"^[A-Za-z0-9_.-]{1,64}$").map_or(false, |re| re.is_match(username))
}

/// Trim and check a username taken from a request body.
///
/// # Errors
/// Returns `AuthError::Validation` if the username is missing or malformed.
pub fn normalize_username(username: Option<&str>) -> Result<String, AuthError> {
    let username = username.map(str::trim).unwrap_or_default();
    if username.is_empty() {
        return Err(AuthError::Validation(MISSING_FIELDS.to_string()));
    }
    if !valid_username(username) {
        return Err(AuthError::Validation("Invalid username".to_string()));
    }
    Ok(username.to_string())
}

pub(crate) fn required(value: Option<String>) -> Result<String, AuthError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AuthError::Validation(MISSING_FIELDS.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Username and password in the JSON body.
    Local { with_profile: bool },
    /// OAuth authorization code in the JSON body.
    Provider,
    /// Session token in the `Authorization` header.
    Bearer,
}

/// First stage of every flow: decides the credential source and rejects
/// requests missing the fields that source needs.
#[derive(Debug, Clone, Copy)]
pub struct ResolveCredentials {
    source: Source,
}

impl ResolveCredentials {
    #[must_use]
    pub fn local() -> Self {
        Self {
            source: Source::Local {
                with_profile: false,
            },
        }
    }

    #[must_use]
    pub fn registration() -> Self {
        Self {
            source: Source::Local { with_profile: true },
        }
    }

    #[must_use]
    pub fn provider() -> Self {
        Self {
            source: Source::Provider,
        }
    }

    #[must_use]
    pub fn bearer() -> Self {
        Self {
            source: Source::Bearer,
        }
    }
}

#[async_trait]
impl Stage for ResolveCredentials {
    fn name(&self) -> &'static str {
        "resolve_credentials"
    }

    async fn run(&self, ctx: &mut Context, inbound: &Inbound) -> StageResult {
        match self.source {
            Source::Local { with_profile } => {
                let request: CredentialsRequest = inbound.json()?;
                let username = normalize_username(request.username.as_deref())?;
                let password = request
                    .password
                    .filter(|p| !p.is_empty())
                    .ok_or_else(|| AuthError::Validation(MISSING_FIELDS.to_string()))?;

                if with_profile {
                    let first_name = required(request.first_name)?;
                    let last_name = required(request.last_name)?;
                    ctx.profile.set(ProfileFields::new(first_name, last_name))?;
                }

                ctx.username.set(username.clone())?;
                ctx.credentials.set(Credentials::Local {
                    username,
                    password: SecretString::from(password),
                })?;
            }
            Source::Provider => {
                let request: ProviderCodeRequest = inbound.json()?;
                let code = required(request.code)?;
                ctx.credentials.set(Credentials::Provider { code })?;
            }
            Source::Bearer => {
                let token = inbound
                    .headers
                    .get(AUTHORIZATION)
                    .and_then(|value| value.to_str().ok())
                    .map(|value| value.trim())
                    .map(|value| value.strip_prefix("Bearer ").unwrap_or(value).trim())
                    .filter(|value| !value.is_empty())
                    .ok_or(AuthError::SessionInvalid)?;
                ctx.credentials.set(Credentials::Bearer {
                    token: token.to_string(),
                })?;
            }
        }

        Ok(Step::Next)
    }
}
