use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{AccessToken, OAuthExchange, ProviderProfile};
use crate::APP_USER_AGENT;

pub const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// GitHub OAuth app credentials and endpoints.
pub struct GitHubExchange {
    client_id: String,
    client_secret: SecretString,
    token_url: String,
    api_url: String,
    http: Client,
}

impl std::fmt::Debug for GitHubExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubExchange")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("api_url", &self.api_url)
            .finish_non_exhaustive()
    }
}

// GitHub answers token errors with 200 and an `error` field.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum TokenResponse {
    Token(AccessToken),
    Error {
        error: String,
        error_description: Option<String>,
    },
}

#[derive(Deserialize, Debug)]
struct GitHubUser {
    id: u64,
    login: String,
    name: Option<String>,
}

impl GitHubExchange {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(client_id: String, client_secret: SecretString) -> Result<Self> {
        Self::with_endpoints(client_id, client_secret, GITHUB_TOKEN_URL, GITHUB_API_URL)
    }

    /// Same as [`GitHubExchange::new`] with explicit endpoints, e.g. GitHub Enterprise.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_endpoints(
        client_id: String,
        client_secret: SecretString,
        token_url: &str,
        api_url: &str,
    ) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .build()
            .context("Error creating reqwest client")?;

        Ok(Self {
            client_id,
            client_secret,
            token_url: token_url.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            http,
        })
    }
}

#[async_trait]
impl OAuthExchange for GitHubExchange {
    #[instrument(skip_all)]
    async fn exchange_code(&self, code: &str) -> Result<AccessToken> {
        let response = self
            .http
            .post(&self.token_url)
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("code", code),
            ])
            .send()
            .await
            .context("token exchange request failed")?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(anyhow!("token exchange returned {status}"));
        }

        match response
            .json::<TokenResponse>()
            .await
            .context("failed to parse token response")?
        {
            TokenResponse::Token(token) => {
                debug!("received GitHub access token");
                Ok(token)
            }
            TokenResponse::Error {
                error,
                error_description,
            } => Err(anyhow!(
                "token exchange rejected: {error} {}",
                error_description.unwrap_or_default()
            )),
        }
    }

    #[instrument(skip_all)]
    async fn fetch_profile(&self, token: &AccessToken) -> Result<ProviderProfile> {
        let response = self
            .http
            .get(format!("{}/user", self.api_url))
            .header(ACCEPT, "application/vnd.github+json")
            .header(
                reqwest::header::AUTHORIZATION,
                format!("{} {}", token.token_type, token.access_token),
            )
            .send()
            .await
            .context("profile request failed")?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("profile request returned {status}"));
        }

        let user: GitHubUser = response
            .json()
            .await
            .context("failed to parse GitHub user")?;

        Ok(ProviderProfile {
            display_name: user.name,
            login: user.login,
            provider_id: user.id.to_string(),
        })
    }
}
