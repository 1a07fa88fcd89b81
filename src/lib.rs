//! VK API client library
//!
//! A rate-limited, captcha-aware client for the VK API, with browser-driven
//! authorization and a bounded worker pool for bulk operations.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`api`] - Rate limiter, call executor with retry and captcha replay, paginator
//! - [`auth`] - Loopback and standalone authorization flows, credentials, scopes
//! - [`config`] - Endpoint, rate limit and retry configuration
//! - [`likes`] - Removing likes from posts, photos and videos
//! - [`pool`] - Fixed-size worker pool with per-group progress
//! - [`prompt`] - Asking a human for input (captcha answers, pasted URLs)

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod api;
pub mod auth;
pub mod config;
pub mod likes;
pub mod pool;
pub mod prompt;

// Re-export commonly used types
pub use api::{
    ApiClient, ApiError, CallParams, Caller, HttpTransport, Paginator, RateLimitConfig,
    RateLimiter, RetryPolicy, Transport,
};
pub use auth::{App, AuthError, Authorizer, Credential, GrantType, Scope};
pub use config::{ClientConfig, ConfigError};
pub use likes::{LikeKind, LikeTarget, Unliker, list_faves};
pub use pool::{PoolConfig, PoolError, WorkItem, WorkerPool};
