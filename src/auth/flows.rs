//! Named flows and the `(route, method)` bindings that select them.

use axum::http::Method;
use std::sync::Arc;

use super::{
    password::PasswordHasher,
    pipeline::Flow,
    session::SessionCodec,
    stages::{
        ComparePassword, DeleteIdentity, ExchangeCode, HashPassword, IssueSession, LoadProfile,
        Lookup, LookupIdentity, PersistIdentity, RequireSettings, ResolveCredentials,
        RespondSessionActive, RespondWithToken, SynthesizeIdentity, UpdateSettings, VerifySession,
    },
};
use crate::oauth::OAuthExchange;
use crate::store::CredentialStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowName {
    Register,
    Login,
    DeleteAccount,
    OAuthLoginOrRegister,
    SessionCheck,
    UpdateSettings,
    Profile,
}

impl FlowName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Login => "login",
            Self::DeleteAccount => "delete_account",
            Self::OAuthLoginOrRegister => "oauth_login_or_register",
            Self::SessionCheck => "session_check",
            Self::UpdateSettings => "update_settings",
            Self::Profile => "profile",
        }
    }

    /// Route pattern and method this flow is served on.
    #[must_use]
    pub fn binding(self) -> (&'static str, Method) {
        match self {
            Self::SessionCheck => ("/auth", Method::GET),
            Self::Register => ("/auth", Method::POST),
            Self::Login => ("/auth", Method::PUT),
            Self::UpdateSettings => ("/user", Method::PUT),
            Self::DeleteAccount => ("/user", Method::DELETE),
            Self::Profile => ("/user/:username", Method::GET),
            Self::OAuthLoginOrRegister => ("/github", Method::POST),
        }
    }

    pub const ALL: [FlowName; 7] = [
        Self::SessionCheck,
        Self::Register,
        Self::Login,
        Self::UpdateSettings,
        Self::DeleteAccount,
        Self::Profile,
        Self::OAuthLoginOrRegister,
    ];
}

impl std::fmt::Display for FlowName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapters and codecs the stages are built from.
#[derive(Clone)]
pub struct Services {
    pub store: Arc<dyn CredentialStore>,
    /// `None` when no OAuth app is configured.
    pub oauth: Option<Arc<dyn OAuthExchange>>,
    pub codec: Arc<SessionCodec>,
    pub hasher: PasswordHasher,
}

impl Services {
    #[must_use]
    pub fn flow(&self, name: FlowName) -> Flow {
        let store = &self.store;
        let hasher = &self.hasher;
        let codec = &self.codec;

        match name {
            FlowName::Register => Flow::new(name.as_str())
                .then(ResolveCredentials::registration())
                .then(LookupIdentity::new(store.clone(), hasher.clone(), Lookup::RequireAbsent))
                .then(HashPassword::new(hasher.clone()))
                .then(IssueSession::new(codec.clone()))
                .then(PersistIdentity::new(store.clone()))
                .then(RespondWithToken::new()),
            FlowName::Login => Flow::new(name.as_str())
                .then(ResolveCredentials::local())
                .then(LookupIdentity::new(store.clone(), hasher.clone(), Lookup::RequireExisting))
                .then(ComparePassword::new(hasher.clone()))
                .then(IssueSession::new(codec.clone()))
                .then(RespondWithToken::new()),
            FlowName::DeleteAccount => Flow::new(name.as_str())
                .then(ResolveCredentials::local())
                .then(LookupIdentity::new(store.clone(), hasher.clone(), Lookup::RequireExisting))
                .then(ComparePassword::new(hasher.clone()))
                .then(DeleteIdentity::new(store.clone())),
            FlowName::OAuthLoginOrRegister => Flow::new(name.as_str())
                .then(ResolveCredentials::provider())
                .then(ExchangeCode::new(self.oauth.clone()))
                .then(LookupIdentity::new(store.clone(), hasher.clone(), Lookup::Either))
                .then(SynthesizeIdentity)
                .then(HashPassword::new(hasher.clone()))
                .then(PersistIdentity::new(store.clone()))
                .then(IssueSession::new(codec.clone()))
                .then(RespondWithToken::with_name()),
            FlowName::SessionCheck => Flow::new(name.as_str())
                .then(ResolveCredentials::bearer())
                .then(VerifySession::new(codec.clone(), store.clone()))
                .then(RespondSessionActive),
            FlowName::UpdateSettings => Flow::new(name.as_str())
                .then(ResolveCredentials::bearer())
                .then(VerifySession::new(codec.clone(), store.clone()))
                .then(RequireSettings)
                .then(UpdateSettings::new(store.clone(), codec.clone())),
            FlowName::Profile => Flow::new(name.as_str())
                .then(ResolveCredentials::bearer())
                .then(VerifySession::new(codec.clone(), store.clone()))
                .then(LoadProfile::new(store.clone())),
        }
    }

    /// Every flow with its binding.
    #[must_use]
    pub fn bindings(&self) -> Vec<(&'static str, Method, Flow)> {
        FlowName::ALL
            .iter()
            .map(|&name| {
                let (route, method) = name.binding();
                (route, method, self.flow(name))
            })
            .collect()
    }
}
