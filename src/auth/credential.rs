//! The bearer credential produced by authorization.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use url::Url;

use super::error::AuthError;
use crate::api::CallParams;

/// An access token with its expiry and owning user.
///
/// Immutable once issued and never persisted by this crate. Treat it as
/// valid until a call fails with an authorization error; there is no
/// refresh, re-run the authorization flow instead.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<SystemTime>,
    user_id: i64,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// JSON answer of the token endpoint.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct TokenResponse {
    #[serde(default)]
    pub(crate) access_token: Option<String>,
    #[serde(default)]
    pub(crate) expires_in: Option<u64>,
    #[serde(default)]
    pub(crate) user_id: Option<i64>,
    #[serde(default)]
    pub(crate) error: Option<String>,
    #[serde(default)]
    pub(crate) error_description: Option<String>,
}

impl Credential {
    /// Creates a credential. `expires_at = None` never expires.
    pub fn new(token: impl Into<String>, expires_at: Option<SystemTime>, user_id: i64) -> Self {
        Self {
            token: token.into(),
            expires_at,
            user_id,
        }
    }

    /// The bearer token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// When the token stops working, `None` for offline tokens.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// The user the token was issued for.
    #[must_use]
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Returns true once the wall clock has passed the expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| SystemTime::now() >= expires_at)
    }

    /// Builds a credential from redirect parameters carrying the token
    /// directly (`access_token`, `expires_in`, `user_id`).
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::RedirectDenied`] if the redirect carries an
    /// error, and a parameter error if a field is missing, not a number or
    /// an unrepresentable lifetime.
    pub fn from_redirect_params(params: &CallParams) -> Result<Self, AuthError> {
        check_redirect_error(params)?;
        let token = params
            .get("access_token")
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingParameter {
                name: "access_token",
            })?;
        let expires_in = parse_param::<u64>(params, "expires_in")?;
        let user_id = parse_param::<i64>(params, "user_id")?;
        Ok(Self::new(token, expiry(expires_in)?, user_id))
    }

    /// Builds a credential from the URL the browser ended up on after a
    /// token grant; the parameters live in the fragment.
    ///
    /// # Errors
    ///
    /// Same as [`from_redirect_params`](Self::from_redirect_params), plus
    /// [`AuthError::InvalidUrl`] if `url` does not parse.
    pub fn from_redirect_url(url: &str) -> Result<Self, AuthError> {
        Self::from_redirect_params(&fragment_params(url)?)
    }

    pub(crate) fn from_token_response(response: TokenResponse) -> Result<Self, AuthError> {
        if let Some(error) = response.error.filter(|error| !error.is_empty()) {
            return Err(AuthError::Exchange {
                error,
                description: response.error_description.unwrap_or_default(),
            });
        }
        let token = response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::MissingParameter {
                name: "access_token",
            })?;
        let expires_in = response.expires_in.unwrap_or(0);
        let user_id = response
            .user_id
            .ok_or(AuthError::MissingParameter { name: "user_id" })?;
        Ok(Self::new(token, expiry(expires_in)?, user_id))
    }
}

/// Fails with [`AuthError::RedirectDenied`] when the redirect carries `error`.
pub(crate) fn check_redirect_error(params: &CallParams) -> Result<(), AuthError> {
    match params.get("error").filter(|error| !error.is_empty()) {
        Some(error) => Err(AuthError::RedirectDenied {
            error: error.to_string(),
            description: params.get("error_description").unwrap_or_default().to_string(),
        }),
        None => Ok(()),
    }
}

/// Decodes the fragment of `url` as form parameters.
pub(crate) fn fragment_params(url: &str) -> Result<CallParams, AuthError> {
    let url = Url::parse(url.trim())?;
    Ok(url::form_urlencoded::parse(url.fragment().unwrap_or_default().as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect())
}

/// `now + expires_in`, or no expiry for a zero lifetime.
fn expiry(expires_in: u64) -> Result<Option<SystemTime>, AuthError> {
    if expires_in == 0 {
        return Ok(None);
    }
    SystemTime::now()
        .checked_add(Duration::from_secs(expires_in))
        .map(Some)
        .ok_or_else(|| AuthError::InvalidParameter {
            name: "expires_in",
            value: expires_in.to_string(),
        })
}

fn parse_param<T: std::str::FromStr>(
    params: &CallParams,
    name: &'static str,
) -> Result<T, AuthError> {
    let value = params
        .get(name)
        .ok_or(AuthError::MissingParameter { name })?;
    value.parse().map_err(|_| AuthError::InvalidParameter {
        name,
        value: value.to_string(),
    })
}
