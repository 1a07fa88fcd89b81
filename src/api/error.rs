//! Error types for the API call layer.
//!
//! This module defines structured errors for transport failures, provider
//! error envelopes, and call-level outcomes, providing context-rich error
//! messages (operation name, redacted URL) for debugging and user feedback.

use std::fmt;

use serde::Deserialize;
use thiserror::Error;

use super::retry::{Classification, classify};

/// Provider error code carried in an `error` envelope.
///
/// Open newtype; codes without a named constant pass through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(transparent)]
pub struct ErrorCode(pub i64);

#[allow(missing_docs)]
impl ErrorCode {
    pub const EMPTY: Self = Self(0);
    pub const UNKNOWN: Self = Self(1);
    pub const APP_STOPPED: Self = Self(2);
    pub const BAD_METHOD: Self = Self(3);
    pub const BAD_SIGNATURE: Self = Self(4);
    pub const AUTH_FAILED: Self = Self(5);
    pub const RATE_LIMIT_EXCEEDED: Self = Self(6);
    pub const PERMISSION_DENIED: Self = Self(7);
    pub const BAD_REQUEST: Self = Self(8);
    pub const TOO_MANY_ACTIONS: Self = Self(9);
    pub const INTERNAL_ERROR: Self = Self(10);
    pub const TEST_MODE: Self = Self(11);
    pub const CAPTCHA_REQUIRED: Self = Self(14);
    pub const ACCESS_DENIED: Self = Self(15);
    pub const SECURE_LAYER_REQUIRED: Self = Self(16);
    pub const USER_VALIDATION_REQUIRED: Self = Self(17);
    pub const PAGE_REMOVED_OR_BLOCKED: Self = Self(18);
    pub const NOT_STANDALONE_PROHIBITED: Self = Self(20);
    pub const ONLY_STANDALONE_ALLOWED: Self = Self(21);
    pub const METHOD_DEPRECATED: Self = Self(23);
    pub const USER_PERMISSION_REQUIRED: Self = Self(24);
    pub const INVALID_COMMUNITY_ACCESS_CODE: Self = Self(27);
    pub const INVALID_APPLICATION_ACCESS_CODE: Self = Self(28);
    pub const INSUFFICIENT_PARAMETERS: Self = Self(100);
    pub const BAD_API_ID: Self = Self(101);
    pub const BAD_USER_ID: Self = Self(113);
    pub const BAD_TIMESTAMP: Self = Self(150);
    pub const ACCESS_DENIED_FOR_ALBUM: Self = Self(200);
    pub const ACCESS_DENIED_FOR_AUDIO: Self = Self(201);
    pub const ACCESS_DENIED_FOR_GROUP: Self = Self(203);
    pub const ALBUM_OVERFLOW: Self = Self(300);
    pub const ACTION_DENIED: Self = Self(500);
    pub const COMMERCIAL_PERMISSION_DENIED: Self = Self(600);
    pub const COMMERCIAL_ERROR: Self = Self(603);
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A request parameter echoed back by the provider inside an error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RequestParam {
    /// Parameter name.
    pub key: String,
    /// Parameter value as the provider saw it.
    #[serde(default)]
    pub value: String,
}

/// Structured error returned by the provider instead of a payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteError {
    /// Provider error code.
    #[serde(rename = "error_code")]
    pub code: ErrorCode,
    /// Human-readable message.
    #[serde(rename = "error_msg", default)]
    pub message: String,
    /// Challenge identifier when the provider wants a captcha solved.
    #[serde(default)]
    pub captcha_sid: Option<String>,
    /// Image URL of the captcha to show to a human.
    #[serde(default)]
    pub captcha_img: Option<String>,
    /// Request parameters as seen by the provider.
    #[serde(rename = "request_params", default)]
    pub params: Vec<RequestParam>,
}

impl RemoteError {
    /// Creates a remote error without captcha or echoed params.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            captcha_sid: None,
            captcha_img: None,
            params: Vec::new(),
        }
    }

    /// Returns `(challenge_id, image_url)` when this error carries a captcha.
    #[must_use]
    pub fn captcha(&self) -> Option<(&str, &str)> {
        let sid = self.captcha_sid.as_deref().filter(|sid| !sid.is_empty())?;
        Some((sid, self.captcha_img.as_deref().unwrap_or_default()))
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message.to_lowercase(), self.code)
    }
}

impl std::error::Error for RemoteError {}

/// Errors produced by a single transport round trip.
///
/// URLs are stored without their query string so access tokens never end
/// up in error messages or logs.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The redacted URL.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The redacted URL.
        url: String,
    },

    /// Non-success HTTP status.
    #[error("HTTP {status} requesting {url}")]
    Status {
        /// The redacted URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The request URL could not be constructed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The offending URL or fragment.
        url: String,
    },
}

impl TransportError {
    /// Creates a network error, mapping reqwest timeouts to [`TransportError::Timeout`].
    pub fn network(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            return Self::Timeout {
                url: redact_url(url),
            };
        }
        Self::Network {
            url: redact_url(url),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn status(url: &str, status: u16) -> Self {
        Self::Status {
            url: redact_url(url),
            status,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }
}

/// Errors surfaced by [`Caller`](super::Caller) and [`Paginator`](super::Paginator).
///
/// Throttling and solved captcha challenges never appear here: they are
/// absorbed by the call loop.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Transport-level failure; never retried by the call layer.
    #[error("{method}: {source}")]
    Transport {
        /// Operation name.
        method: String,
        /// The transport failure.
        #[source]
        source: TransportError,
    },

    /// The provider returned a permanent error or an unresolved challenge.
    #[error("{method}: {error}")]
    Remote {
        /// Operation name.
        method: String,
        /// The provider error.
        #[source]
        error: RemoteError,
    },

    /// The response body was not the JSON we expected.
    #[error("{context}: malformed response: {source}")]
    Decode {
        /// Operation name or decoder description.
        context: String,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// The provider kept throttling beyond the configured retry ceiling.
    #[error("{method}: still throttled after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Operation name.
        method: String,
        /// Number of attempts made.
        attempts: u32,
        /// The last throttling error.
        last: RemoteError,
    },

    /// The shared rate limiter was closed.
    #[error("{method}: rate limiter closed")]
    LimiterClosed {
        /// Operation name.
        method: String,
    },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Creates a transport error.
    pub fn transport(method: impl Into<String>, source: TransportError) -> Self {
        Self::Transport {
            method: method.into(),
            source,
        }
    }

    /// Creates a remote error.
    pub fn remote(method: impl Into<String>, error: RemoteError) -> Self {
        Self::Remote {
            method: method.into(),
            error,
        }
    }

    /// Creates a decode error.
    pub fn decode(context: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            context: context.into(),
            source,
        }
    }

    /// Returns the provider error, if this is one.
    #[must_use]
    pub fn remote_error(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote { error, .. } | Self::RetriesExhausted { last: error, .. } => Some(error),
            _ => None,
        }
    }

    /// Classifies the provider error, if this is one.
    #[must_use]
    pub fn classification(&self) -> Option<Classification> {
        self.remote_error().map(classify)
    }

    /// Returns true if the caller aborted the operation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Returns true if the provider rejected the credential.
    ///
    /// Callers re-run authorization when this is set; there is no implicit refresh.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        self.remote_error()
            .is_some_and(|error| error.code == ErrorCode::AUTH_FAILED)
    }
}

/// Strips the query string and fragment from a URL.
pub(crate) fn redact_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end].to_string()
}
