//! Authorization: obtaining a bearer [`Credential`].
//!
//! The loopback flow binds a one-shot [`RedirectListener`], opens the
//! provider's page through a [`BrowserLauncher`] and turns the captured
//! redirect into a credential. The standalone flow asks a human to paste
//! the final URL instead.

mod authorizer;
mod browser;
mod credential;
mod error;
mod listener;
mod scope;

pub use authorizer::{App, AuthEndpoints, AuthState, Authorizer, GrantType};
pub use browser::{BrowserError, BrowserLauncher, SystemBrowser};
pub use credential::Credential;
pub use error::AuthError;
pub use listener::{
    DEFAULT_REDIRECT_HOST, ListenerError, RedirectCapture, RedirectListener, RedirectRequest,
};
pub use scope::{ParseScopeError, Scope};
