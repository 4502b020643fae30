use secrecy::SecretString;

/// Secrets resolved at startup, kept out of `Debug` output.
#[derive(Debug, Clone)]
pub struct GlobalArgs {
    pub session_secret: SecretString,
    pub github_client_id: Option<String>,
    pub github_client_secret: Option<SecretString>,
}

impl GlobalArgs {
    #[must_use]
    pub fn new(session_secret: SecretString) -> Self {
        Self {
            session_secret,
            github_client_id: None,
            github_client_secret: None,
        }
    }

    pub fn set_github(&mut self, client_id: String, client_secret: SecretString) {
        self.github_client_id = Some(client_id);
        self.github_client_secret = Some(client_secret);
    }

    /// Both halves of the GitHub app credentials, if configured.
    #[must_use]
    pub fn github(&self) -> Option<(&str, &SecretString)> {
        match (&self.github_client_id, &self.github_client_secret) {
            (Some(id), Some(secret)) => Some((id.as_str(), secret)),
            _ => None,
        }
    }
}
