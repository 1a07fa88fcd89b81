//! HTTP transport used by the call layer and the token exchange.
//!
//! [`Transport`] is the seam between request construction and the network:
//! one GET of a fully-built URL, returning the raw body of a `200 OK`
//! response. [`HttpTransport`] is the reqwest-backed implementation; tests
//! substitute their own.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::error::{TransportError, redact_url};

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (60 seconds).
pub const READ_TIMEOUT_SECS: u64 = 60;

const USER_AGENT: &str = concat!("vk-client/", env!("CARGO_PKG_VERSION"));

/// Performs one remote round trip.
///
/// Implementations report any status other than `200 OK` as
/// [`TransportError::Status`]; they never retry.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Issues a GET for `url` and returns the response body.
    async fn get(&self, url: Url) -> Result<Vec<u8>, TransportError>;
}

/// reqwest-backed [`Transport`].
///
/// Created once and shared (it is cheap to clone), taking advantage of
/// connection pooling.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Creates a transport with default timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(
            Duration::from_secs(CONNECT_TIMEOUT_SECS),
            Duration::from_secs(READ_TIMEOUT_SECS),
        )
    }

    /// Creates a transport with explicit timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout: Duration, read_timeout: Duration) -> Self {
        let client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Wraps an already configured reqwest client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip_all, fields(url = %redact_url(url.as_str())))]
    async fn get(&self, url: Url) -> Result<Vec<u8>, TransportError> {
        let url_text = url.to_string();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| TransportError::network(&url_text, source))?;

        let status = response.status();
        if status != StatusCode::OK {
            debug!(status = status.as_u16(), "unexpected status");
            return Err(TransportError::status(&url_text, status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::network(&url_text, source))?;
        debug!(bytes = body.len(), "response received");
        Ok(body.to_vec())
    }
}
