//! # VaaS (authentication gateway)
//!
//! `vaas` fronts the VaaS control-plane backend. Every request passes through a
//! method/route guard and, for the account endpoints, through an authentication
//! pipeline: an ordered list of stages sharing one per-request [`auth::Context`].
//!
//! ## Identity Sources
//!
//! Two credential sources resolve to the same account model:
//!
//! - **Local:** username and password, hashed with Argon2id.
//! - **GitHub OAuth:** an authorization code is exchanged for a provider profile;
//!   the provider login becomes the username and the account is created on first use.
//!
//! ## Sessions
//!
//! Sessions are stateless HS512-signed tokens. A token is `active` until its expiry,
//! then in `grace` for a configurable window (accepted and silently re-issued), then
//! `expired`. Tampered or malformed tokens are rejected with the same unauthorized
//! response as expired ones.

pub mod auth;
pub mod cli;
pub mod oauth;
pub mod store;
pub mod vaas;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
