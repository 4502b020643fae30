//! OAuth exchange adapter.
//!
//! Turns an authorization code into a provider profile in two calls. Both return
//! `Err` for any transport or provider fault; the pipeline bounds them with the
//! request timeout and reports failures as upstream faults.

pub mod github;

pub use github::GitHubExchange;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub access_token: String,
    pub token_type: String,
}

/// Provider account as seen by the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    pub display_name: Option<String>,
    /// Becomes the local username.
    pub login: String,
    /// Stable provider-side account id.
    pub provider_id: String,
}

impl ProviderProfile {
    /// First and last name from the display name, falling back to the login.
    #[must_use]
    pub fn split_name(&self) -> (String, String) {
        let display = self
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty());

        match display {
            Some(name) => match name.split_once(char::is_whitespace) {
                Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
                None => (name.to_string(), String::new()),
            },
            None => (self.login.clone(), String::new()),
        }
    }
}

#[async_trait]
pub trait OAuthExchange: Send + Sync {
    async fn exchange_code(&self, code: &str) -> Result<AccessToken>;

    async fn fetch_profile(&self, token: &AccessToken) -> Result<ProviderProfile>;
}
