//! Classification of provider errors and the transient-retry policy.
//!
//! When a call returns an error envelope, the [`RemoteError`] is classified
//! into a [`Classification`]:
//! - [`Classification::Transient`] - throttling; retry the same request unchanged
//! - [`Classification::Challenge`] - captcha; resolve it, then retry with the answer
//! - [`Classification::Permanent`] - everything else; surface to the caller
//!
//! The [`RetryPolicy`] then decides whether another throttled attempt is
//! allowed and how long to back off before it. Pacing between attempts is
//! mostly done by the shared rate limiter; the backoff only spreads out
//! retries after flood-control responses.
//!
//! # Example
//!
//! ```
//! use vk_client::api::{Classification, ErrorCode, RemoteError, RetryDecision, RetryPolicy, classify};
//!
//! let policy = RetryPolicy::default();
//! let error = RemoteError::new(ErrorCode::RATE_LIMIT_EXCEEDED, "Too many requests per second");
//!
//! match policy.should_retry(classify(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::error::{ErrorCode, RemoteError};

/// Default ceiling on consecutive throttled attempts for one call.
pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 64;

/// Default ceiling on captcha rounds for one call.
pub const DEFAULT_MAX_CHALLENGES: u32 = 3;

/// Default base delay before a throttled retry.
const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(200);

/// Default maximum delay cap.
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Maximum jitter added to non-zero delays.
const MAX_JITTER: Duration = Duration::from_millis(100);

/// How the call layer reacts to a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Safe to retry unchanged (rate limit, flood control).
    Transient,
    /// A captcha must be solved out of band, then the call retried.
    Challenge,
    /// Surface to the caller.
    Permanent,
}

/// Decision on whether to retry a throttled call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Retry limits for the call layer.
///
/// `max_transient_retries = None` retries throttled calls for as long as the
/// provider keeps throttling, bounded only by cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_transient_retries: Option<u32>,
    max_challenges: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_transient_retries: Some(DEFAULT_MAX_TRANSIENT_RETRIES),
            max_challenges: DEFAULT_MAX_CHALLENGES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with explicit limits.
    #[must_use]
    pub fn new(
        max_transient_retries: Option<u32>,
        max_challenges: u32,
        base_delay: Duration,
        max_delay: Duration,
    ) -> Self {
        Self {
            max_transient_retries,
            max_challenges,
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    /// Retries throttled calls until the provider stops throttling.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            max_transient_retries: None,
            ..Self::default()
        }
    }

    /// Creates a policy with a custom transient ceiling, defaults elsewhere.
    #[must_use]
    pub fn with_max_transient_retries(max: u32) -> Self {
        Self {
            max_transient_retries: Some(max),
            ..Self::default()
        }
    }

    /// Returns a copy of this policy without backoff delays.
    #[must_use]
    pub fn without_backoff(mut self) -> Self {
        self.base_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self
    }

    /// Returns the transient retry ceiling, `None` when unbounded.
    #[must_use]
    pub fn max_transient_retries(&self) -> Option<u32> {
        self.max_transient_retries
    }

    /// Returns how many captcha rounds one call may go through.
    #[must_use]
    pub fn max_challenges(&self) -> u32 {
        self.max_challenges
    }

    /// Determines whether to retry after a failed attempt.
    ///
    /// `attempt` is the 1-indexed attempt that just failed.
    #[instrument(level = "trace", skip(self))]
    pub fn should_retry(&self, classification: Classification, attempt: u32) -> RetryDecision {
        match classification {
            Classification::Permanent => {
                return RetryDecision::DoNotRetry {
                    reason: "permanent provider error".to_string(),
                };
            }
            Classification::Challenge => {
                return RetryDecision::DoNotRetry {
                    reason: "challenge must be resolved before retrying".to_string(),
                };
            }
            Classification::Transient => {}
        }

        if let Some(max) = self.max_transient_retries
            && attempt > max
        {
            debug!(attempt, max, "transient retry ceiling reached");
            return RetryDecision::DoNotRetry {
                reason: format!("still throttled after {attempt} attempts"),
            };
        }

        RetryDecision::Retry {
            delay: self.calculate_delay(attempt),
            attempt: attempt + 1,
        }
    }

    /// `min(base * 2^(attempt-1), max) + jitter`; zero base disables both.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay);
        delay + calculate_jitter()
    }
}

fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    #[allow(clippy::cast_possible_truncation)]
    let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
    Duration::from_millis(jitter_ms)
}

/// Classifies a provider error.
///
/// | Code | Class | Meaning |
/// |------|-------|---------|
/// | 6 | Transient | Too many requests per second |
/// | 9 | Transient | Flood control |
/// | 14 | Challenge | Captcha needed (only when a challenge id is present) |
/// | other | Permanent | |
#[must_use]
pub fn classify(error: &RemoteError) -> Classification {
    match error.code {
        ErrorCode::RATE_LIMIT_EXCEEDED | ErrorCode::TOO_MANY_ACTIONS => Classification::Transient,
        ErrorCode::CAPTCHA_REQUIRED if error.captcha().is_some() => Classification::Challenge,
        _ => Classification::Permanent,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn remote(code: ErrorCode) -> RemoteError {
        RemoteError::new(code, "test")
    }

    #[test]
    fn test_classify_throttling_is_transient() {
        assert_eq!(
            classify(&remote(ErrorCode::RATE_LIMIT_EXCEEDED)),
            Classification::Transient
        );
        assert_eq!(
            classify(&remote(ErrorCode::TOO_MANY_ACTIONS)),
            Classification::Transient
        );
    }

    #[test]
    fn test_classify_captcha_with_sid_is_challenge() {
        let mut error = remote(ErrorCode::CAPTCHA_REQUIRED);
        assert_eq!(classify(&error), Classification::Permanent);
        error.captcha_sid = Some("42".to_string());
        error.captcha_img = Some("https://example.com/c.png".to_string());
        assert_eq!(classify(&error), Classification::Challenge);
    }

    #[test]
    fn test_classify_everything_else_is_permanent() {
        for code in [
            ErrorCode::UNKNOWN,
            ErrorCode::AUTH_FAILED,
            ErrorCode::PERMISSION_DENIED,
            ErrorCode::ACCESS_DENIED,
            ErrorCode(9999),
        ] {
            assert_eq!(classify(&remote(code)), Classification::Permanent, "{code}");
        }
    }

    #[test]
    fn test_retry_policy_default_values() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.max_transient_retries(),
            Some(DEFAULT_MAX_TRANSIENT_RETRIES)
        );
        assert_eq!(policy.max_challenges(), DEFAULT_MAX_CHALLENGES);
    }

    #[test]
    fn test_should_retry_permanent_and_challenge_never_retry() {
        let policy = RetryPolicy::default();
        assert!(matches!(
            policy.should_retry(Classification::Permanent, 1),
            RetryDecision::DoNotRetry { .. }
        ));
        assert!(matches!(
            policy.should_retry(Classification::Challenge, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_should_retry_respects_ceiling() {
        let policy = RetryPolicy::with_max_transient_retries(2).without_backoff();
        assert_eq!(
            policy.should_retry(Classification::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 2
            }
        );
        assert!(matches!(
            policy.should_retry(Classification::Transient, 2),
            RetryDecision::Retry { attempt: 3, .. }
        ));
        assert!(matches!(
            policy.should_retry(Classification::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_unbounded_policy_keeps_retrying() {
        let policy = RetryPolicy::unbounded().without_backoff();
        assert!(matches!(
            policy.should_retry(Classification::Transient, 1_000_000),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::new(
            None,
            1,
            Duration::from_millis(100),
            Duration::from_millis(300),
        );
        let first = policy.calculate_delay(1);
        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(200));

        let capped = policy.calculate_delay(10);
        assert!(capped >= Duration::from_millis(300));
        assert!(capped <= Duration::from_millis(400));
    }

    #[test]
    fn test_zero_base_delay_has_no_jitter() {
        let policy = RetryPolicy::default().without_backoff();
        assert_eq!(policy.calculate_delay(5), Duration::ZERO);
    }
}
