//! CLI command handlers.

mod auth;
mod call;
mod session;
mod unlike;

pub use auth::run_auth_command;
pub use call::run_call_command;
pub use session::Session;
pub use unlike::{UnlikeRequest, UnlikeTargets, run_unlike_command};
