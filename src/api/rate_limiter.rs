//! Token-bucket rate limiting shared by every outbound call.
//!
//! This module provides the [`RateLimiter`] struct which grants at most
//! `burst` calls per `interval`, matching the provider's per-token request
//! quota so calls are not rejected with "too many requests per second".
//!
//! # Overview
//!
//! The bucket is a counting semaphore holding up to `burst` tickets. A
//! background task owned by the limiter tops the bucket back up to `burst`
//! on every `interval` tick. [`RateLimiter::acquire`] consumes one ticket,
//! suspending until one is available or the caller's cancellation token
//! fires. Blocked callers are not served in FIFO order.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vk_client::api::{RateLimitConfig, RateLimiter};
//!
//! # async fn example() {
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
//! let cancel = CancellationToken::new();
//!
//! // Up to three calls proceed immediately, the fourth waits for the refill.
//! for _ in 0..4 {
//!     limiter.acquire(&cancel).await.unwrap();
//! }
//! # }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Default refill interval: one third of a second.
pub const DEFAULT_RATE_INTERVAL: Duration = Duration::from_nanos(333_333_334);

/// Default bucket capacity (three requests per second in total).
pub const DEFAULT_RATE_BURST: usize = 3;

/// Interval and capacity of a [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// How often the bucket is refilled to capacity.
    pub interval: Duration,
    /// Bucket capacity; the maximum number of grants per interval.
    pub burst: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_RATE_INTERVAL,
            burst: DEFAULT_RATE_BURST,
        }
    }
}

/// Why a ticket could not be acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    /// The caller's cancellation token fired first.
    #[error("rate limiter acquisition cancelled")]
    Cancelled,
    /// The limiter was closed.
    #[error("rate limiter closed")]
    Closed,
}

/// Token-bucket rate limiter.
///
/// Designed to be wrapped in `Arc` and shared across callers, paginators and
/// pool workers. Dropping the last handle stops the refill task.
#[derive(Debug)]
pub struct RateLimiter {
    tickets: Arc<Semaphore>,
    config: RateLimitConfig,
    /// Unlimited limiters hand tickets straight back.
    disabled: bool,
    refill: Option<JoinHandle<()>>,
}

impl RateLimiter {
    /// Creates a limiter and starts its refill task.
    ///
    /// The bucket starts full. A zero `burst` is raised to one and a zero
    /// `interval` to one millisecond; [`ClientConfig::validate`] rejects both
    /// before they get here.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    ///
    /// [`ClientConfig::validate`]: crate::config::ClientConfig::validate
    #[must_use]
    #[instrument(skip_all, fields(interval_ms = config.interval.as_millis(), burst = config.burst))]
    pub fn new(config: RateLimitConfig) -> Self {
        let config = RateLimitConfig {
            interval: config.interval.max(Duration::from_millis(1)),
            burst: config.burst.max(1),
        };
        debug!("creating rate limiter");

        let tickets = Arc::new(Semaphore::new(config.burst));
        let refill = spawn_refill(Arc::downgrade(&tickets), config);
        Self {
            tickets,
            config,
            disabled: false,
            refill: Some(refill),
        }
    }

    /// Creates a limiter that never delays; closing and cancellation still apply.
    #[must_use]
    #[instrument]
    pub fn unlimited() -> Self {
        debug!("creating unlimited rate limiter");
        Self {
            tickets: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            config: RateLimitConfig {
                interval: Duration::ZERO,
                burst: Semaphore::MAX_PERMITS,
            },
            disabled: true,
            refill: None,
        }
    }

    /// Returns the limiter configuration.
    #[must_use]
    pub fn config(&self) -> RateLimitConfig {
        self.config
    }

    /// Returns whether this limiter applies no rate limit.
    #[must_use]
    pub fn is_disabled(&self) -> bool {
        self.disabled
    }

    /// Returns the number of tickets currently in the bucket.
    #[must_use]
    pub fn available(&self) -> usize {
        self.tickets.available_permits()
    }

    /// Takes one ticket, waiting for a refill if the bucket is empty.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Cancelled`] as soon as `cancel` fires, and
    /// [`RateLimitError::Closed`] once [`close`](Self::close) has been called.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        if cancel.is_cancelled() {
            return Err(RateLimitError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RateLimitError::Cancelled),
            permit = self.tickets.acquire() => permit.map_err(|_| RateLimitError::Closed)?,
        };

        if self.disabled {
            drop(permit);
        } else {
            // Tickets only come back through the refill task.
            permit.forget();
        }
        trace!(available = self.tickets.available_permits(), "ticket granted");
        Ok(())
    }

    /// Closes the limiter: pending and future acquisitions fail with
    /// [`RateLimitError::Closed`].
    pub fn close(&self) {
        debug!("closing rate limiter");
        self.tickets.close();
    }

    /// Returns whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tickets.is_closed()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Some(refill) = self.refill.take() {
            refill.abort();
        }
    }
}

fn spawn_refill(tickets: Weak<Semaphore>, config: RateLimitConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + config.interval, config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(tickets) = tickets.upgrade() else {
                break;
            };
            if tickets.is_closed() {
                break;
            }
            // Only this task adds permits, so topping up never overshoots.
            let missing = config.burst.saturating_sub(tickets.available_permits());
            if missing > 0 {
                tickets.add_permits(missing);
                trace!(added = missing, "refilled rate limiter");
            }
        }
    })
}
