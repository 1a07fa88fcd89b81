//! Error types for the authorization flow.

use thiserror::Error;

use super::browser::BrowserError;
use super::listener::ListenerError;
use crate::api::TransportError;
use crate::prompt::PromptError;

/// Errors that abort an authorization run.
///
/// Every variant leaves nothing behind: the listener and any browser
/// process are torn down before the error is returned.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The loopback listener failed to start or to capture the redirect.
    #[error("redirect listener failed: {0}")]
    Listener(#[source] ListenerError),

    /// The browser could not be launched.
    #[error("failed to open browser: {0}")]
    Browser(#[source] BrowserError),

    /// The provider redirected back with an error.
    #[error("bad redirect: {error}: {description}")]
    RedirectDenied {
        /// Value of the `error` parameter.
        error: String,
        /// Value of the `error_description` parameter.
        description: String,
    },

    /// The redirect carried a `state` that does not match the one sent.
    #[error("redirect state does not match the authorization request")]
    StateMismatch,

    /// A required redirect or token parameter was absent.
    #[error("missing parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: &'static str,
    },

    /// A redirect or token parameter had an unusable value.
    #[error("invalid {name}: {value:?}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The offending value.
        value: String,
    },

    /// A pasted or configured URL could not be parsed.
    #[error("invalid URL: {source}")]
    InvalidUrl {
        /// The parse error.
        #[from]
        source: url::ParseError,
    },

    /// The token endpoint answered with an error object.
    #[error("token exchange failed: {error}: {description}")]
    Exchange {
        /// Value of the `error` field.
        error: String,
        /// Value of the `error_description` field.
        description: String,
    },

    /// The token exchange request failed.
    #[error("token exchange failed: {0}")]
    Transport(#[from] TransportError),

    /// The token exchange response was not the expected JSON.
    #[error("malformed token response: {0}")]
    Decode(#[from] serde_json::Error),

    /// Asking the human for the redirect URL failed.
    #[error("prompt failed: {0}")]
    Prompt(#[source] PromptError),

    /// The caller cancelled the flow.
    #[error("authorization cancelled")]
    Cancelled,
}

impl AuthError {
    /// Returns true if the caller aborted the flow.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<ListenerError> for AuthError {
    fn from(error: ListenerError) -> Self {
        match error {
            ListenerError::Cancelled => Self::Cancelled,
            other => Self::Listener(other),
        }
    }
}

impl From<BrowserError> for AuthError {
    fn from(error: BrowserError) -> Self {
        match error {
            BrowserError::Cancelled => Self::Cancelled,
            other => Self::Browser(other),
        }
    }
}

impl From<PromptError> for AuthError {
    fn from(error: PromptError) -> Self {
        match error {
            PromptError::Cancelled => Self::Cancelled,
            other => Self::Prompt(other),
        }
    }
}
