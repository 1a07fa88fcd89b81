//! Resilient call layer for the resource API.
//!
//! # Overview
//!
//! - [`RateLimiter`] - token bucket shared by every outbound call
//! - [`Transport`] - one GET per attempt, [`HttpTransport`] in production
//! - [`Caller`] - one logical invocation with throttling retry and captcha replay
//! - [`Paginator`] - offset walker over multi-page results
//! - [`ApiClient`] - shared limiter, transport and credential for a session

mod captcha;
mod client;
mod envelope;
mod error;
mod executor;
mod paginator;
mod params;
mod rate_limiter;
mod retry;
mod transport;

pub use captcha::{CaptchaResolver, PromptCaptchaResolver};
pub use client::ApiClient;
pub use envelope::{Envelope, decode_envelope};
pub use error::{ApiError, ErrorCode, RemoteError, RequestParam, TransportError};
pub use executor::{ApiEndpoint, Caller, DEFAULT_API_BASE, DEFAULT_API_VERSION};
pub use paginator::{ItemsPage, PageDecoder, Paginator};
pub use params::{
    CallParams, QueryOption, with_access_token, with_number, with_numbers, with_options,
    with_param, with_query, with_strings,
};
pub use rate_limiter::{
    DEFAULT_RATE_BURST, DEFAULT_RATE_INTERVAL, RateLimitConfig, RateLimitError, RateLimiter,
};
pub use retry::{
    Classification, DEFAULT_MAX_CHALLENGES, DEFAULT_MAX_TRANSIENT_RETRIES, RetryDecision,
    RetryPolicy, classify,
};
pub use transport::{CONNECT_TIMEOUT_SECS, HttpTransport, READ_TIMEOUT_SECS, Transport};
