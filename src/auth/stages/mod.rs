//! Stages shared by the flows.
//!
//! Each stage reads what earlier stages put in the [`Context`](super::Context)
//! and either adds to it or ends the request.

pub mod credentials;
pub mod identity;
pub mod oauth;
pub mod password;
pub mod profile;
pub mod session;

pub use credentials::ResolveCredentials;
pub use identity::{DeleteIdentity, Lookup, LookupIdentity, PersistIdentity};
pub use oauth::{ExchangeCode, SynthesizeIdentity};
pub use password::{ComparePassword, HashPassword};
pub use profile::{LoadProfile, RequireSettings, UpdateSettings};
pub use session::{IssueSession, RespondSessionActive, RespondWithToken, VerifySession};
