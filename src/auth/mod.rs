//! Request authentication pipeline.
//!
//! A request is first checked by the [`guard::RouteTable`] (method allow-list per
//! declared route), then resolved to a [`pipeline::Flow`] by `(route, method)`.
//! The flow runs its stages in order against one [`Context`]; the first stage that
//! produces a response ends the request.
//!
//! ## Flows
//!
//! | binding | flow |
//! |---|---|
//! | `GET /auth` | session check |
//! | `POST /auth` | register |
//! | `PUT /auth` | login |
//! | `PUT /user` | update settings |
//! | `DELETE /user` | delete account |
//! | `GET /user/:username` | profile |
//! | `POST /github` | OAuth login or register |
//!
//! Login failures never reveal whether the username exists: an unknown user and
//! a wrong password produce the same `401` body.

pub mod context;
pub mod error;
pub mod flows;
pub mod gateway;
pub mod guard;
pub mod password;
pub mod pipeline;
pub mod session;
pub mod stages;
pub mod types;

pub use context::{Context, Credentials, Slot};
pub use error::AuthError;
pub use flows::{FlowName, Services};
pub use gateway::Gateway;
pub use guard::RouteTable;
pub use password::PasswordHasher;
pub use pipeline::{Flow, Stage, StageResult, Step};
pub use session::{classify_expiration, Expiration, IssuedToken, Session, SessionCodec, Verification};
pub use types::{Inbound, Reply};
