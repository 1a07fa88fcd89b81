//! Client configuration: endpoints, protocol version, rate limit, retries.
//!
//! [`ClientConfig::default`] points at the production provider. Endpoint
//! URLs are kept as strings so a CLI flag or a test can swap them in, and
//! [`ClientConfig::validate`] parses every one of them up front so a typo
//! fails at startup instead of on the first call.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::api::{
    ApiEndpoint, CONNECT_TIMEOUT_SECS, DEFAULT_API_BASE, DEFAULT_API_VERSION, READ_TIMEOUT_SECS,
    RateLimitConfig, RetryPolicy,
};
use crate::auth::{AuthEndpoints, DEFAULT_REDIRECT_HOST};

/// Browser-facing authorization page.
pub const DEFAULT_OAUTH_AUTHORIZE: &str = "https://oauth.vk.com/authorize";

/// Code exchange endpoint.
pub const DEFAULT_OAUTH_ACCESS_TOKEN: &str = "https://oauth.vk.com/access_token";

/// The provider's landing page for the standalone flow.
pub const DEFAULT_STANDALONE_REDIRECT: &str = "https://oauth.vk.com/blank.html";

/// Errors from validating a [`ClientConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A URL field does not parse.
    #[error("invalid {field} URL '{value}'")]
    InvalidUrl {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Parser error.
        #[source]
        source: url::ParseError,
    },

    /// A URL cannot carry path segments (`mailto:`, `data:`, ...).
    #[error("{field} URL '{value}' cannot be used as a base")]
    NotABase {
        /// Name of the offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// The protocol version is empty or not `major.minor`.
    #[error("invalid API version '{version}'")]
    InvalidVersion {
        /// The rejected version.
        version: String,
    },

    /// The rate limit burst is zero.
    #[error("rate limit burst must be at least 1")]
    ZeroBurst,

    /// The rate limit interval is zero.
    #[error("rate limit interval must be greater than zero")]
    ZeroInterval,
}

impl ConfigError {
    /// Creates a [`ConfigError::NotABase`].
    pub fn not_a_base(field: &'static str, value: impl Into<String>) -> Self {
        Self::NotABase {
            field,
            value: value.into(),
        }
    }

    fn invalid_url(field: &'static str, value: &str, source: url::ParseError) -> Self {
        Self::InvalidUrl {
            field,
            value: value.to_string(),
            source,
        }
    }
}

/// Everything needed to build limiters, callers and authorizers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Method endpoint root; a call goes to `<api_base>/<method>`.
    pub api_base: String,
    /// Authorization page.
    pub oauth_authorize: String,
    /// Code exchange endpoint.
    pub oauth_access_token: String,
    /// Landing page for the standalone flow.
    pub standalone_redirect: String,
    /// Protocol version sent as `v`.
    pub api_version: String,
    /// Shared rate limit.
    pub rate_limit: RateLimitConfig,
    /// Retry limits of the call layer.
    pub retry: RetryPolicy,
    /// Host the loopback listener binds to.
    pub redirect_host: String,
    /// Port the loopback listener binds to, 0 for ephemeral.
    pub redirect_port: u16,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
    /// HTTP read timeout.
    pub read_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            oauth_authorize: DEFAULT_OAUTH_AUTHORIZE.to_string(),
            oauth_access_token: DEFAULT_OAUTH_ACCESS_TOKEN.to_string(),
            standalone_redirect: DEFAULT_STANDALONE_REDIRECT.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
            rate_limit: RateLimitConfig::default(),
            retry: RetryPolicy::default(),
            redirect_host: DEFAULT_REDIRECT_HOST.to_string(),
            redirect_port: 0,
            connect_timeout: Duration::from_secs(CONNECT_TIMEOUT_SECS),
            read_timeout: Duration::from_secs(READ_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.rate_limit.interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        self.api_endpoint()?;
        self.auth_endpoints()?;
        Ok(())
    }

    /// Parses the method endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `api_base` or `api_version` is malformed.
    pub fn api_endpoint(&self) -> Result<ApiEndpoint, ConfigError> {
        let base = parse_base("api_base", &self.api_base)?;
        ApiEndpoint::new(base, self.api_version.clone())
    }

    /// Parses the authorization endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if any OAuth URL or `api_version` is malformed.
    pub fn auth_endpoints(&self) -> Result<AuthEndpoints, ConfigError> {
        if !is_valid_version(&self.api_version) {
            return Err(ConfigError::InvalidVersion {
                version: self.api_version.clone(),
            });
        }
        Ok(AuthEndpoints {
            authorize: parse_base("oauth_authorize", &self.oauth_authorize)?,
            access_token: parse_base("oauth_access_token", &self.oauth_access_token)?,
            standalone_redirect: parse_base("standalone_redirect", &self.standalone_redirect)?,
            version: self.api_version.clone(),
        })
    }
}

fn parse_base(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|source| ConfigError::invalid_url(field, value, source))?;
    if url.cannot_be_a_base() {
        return Err(ConfigError::not_a_base(field, value));
    }
    Ok(url)
}

/// `major.minor` with both parts numeric.
pub(crate) fn is_valid_version(version: &str) -> bool {
    version.split_once('.').is_some_and(|(major, minor)| {
        !major.is_empty()
            && !minor.is_empty()
            && major.bytes().all(|b| b.is_ascii_digit())
            && minor.bytes().all(|b| b.is_ascii_digit())
    })
}
