//! One logical remote invocation.
//!
//! A [`Caller`] binds an operation name to the shared rate limiter, a
//! transport and a set of fixed options. Each [`Caller::call`] runs an
//! explicit loop:
//!
//! 1. acquire a rate-limiter ticket,
//! 2. build the request URL and perform the transport GET,
//! 3. decode the envelope and classify any provider error.
//!
//! Throttling loops back to step 1. A captcha challenge is handed to the
//! configured [`CaptchaResolver`]; its answer is stored in the caller's
//! session parameters and replayed on the retry and on every later call
//! made through the same instance. Only one challenge is resolved at a time
//! per instance: calls that hit the challenge while it is being solved wait
//! for the answer and retry with it. Everything else is returned.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use url::Url;
//! use vk_client::api::{ApiEndpoint, Caller, HttpTransport, RateLimitConfig, RateLimiter, with_number};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = ApiEndpoint::new(Url::parse("https://api.vk.com/method")?, "5.131")?;
//! let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
//! let caller = Caller::new(endpoint, "users.get", limiter, Arc::new(HttpTransport::new()))
//!     .with_options(vec![with_number("user_ids", 1)]);
//!
//! let payload = caller.call(&CancellationToken::new(), &[]).await?;
//! println!("{}", String::from_utf8_lossy(&payload));
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::captcha::CaptchaResolver;
use super::envelope::{Envelope, decode_envelope};
use super::error::{ApiError, RemoteError, TransportError, redact_url};
use super::params::{CallParams, QueryOption};
use super::rate_limiter::{RateLimitError, RateLimiter};
use super::retry::{Classification, RetryDecision, RetryPolicy, classify};
use super::transport::Transport;
use crate::config::{ConfigError, is_valid_version};
use crate::prompt::PromptError;

/// Production resource endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.vk.com/method";

/// Protocol version sent as `v` on every request.
pub const DEFAULT_API_VERSION: &str = "5.131";

/// Base URL and protocol version of the resource API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpoint {
    base: Url,
    version: String,
}

impl ApiEndpoint {
    /// Validates and wraps an endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `base` cannot carry path segments or the
    /// version is not `major.minor`.
    pub fn new(base: Url, version: impl Into<String>) -> Result<Self, ConfigError> {
        if base.cannot_be_a_base() {
            return Err(ConfigError::not_a_base("api_base", base.as_str()));
        }
        let version = version.into();
        if !is_valid_version(&version) {
            return Err(ConfigError::InvalidVersion { version });
        }
        Ok(Self { base, version })
    }

    /// The base URL operations are appended to.
    #[must_use]
    pub fn base(&self) -> &Url {
        &self.base
    }

    /// The protocol version.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    fn method_url(&self, method: &str) -> Option<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut().ok()?.pop_if_empty().push(method);
        Some(url)
    }
}

/// Parameters carried over between calls, with a count of stored solutions.
#[derive(Debug, Default)]
struct Session {
    params: CallParams,
    solutions: u64,
}

/// Executes one named operation under the shared rate limit.
///
/// Safe to share between tasks; solved challenges are visible to every
/// concurrent and later call through the same instance.
pub struct Caller {
    endpoint: ApiEndpoint,
    method: String,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    options: Vec<QueryOption>,
    resolver: Option<Arc<dyn CaptchaResolver>>,
    policy: RetryPolicy,
    session: Mutex<Session>,
    solving: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("options", &self.options.len())
            .field("resolver", &self.resolver.is_some())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Caller {
    /// Creates a caller for `method`.
    pub fn new(
        endpoint: ApiEndpoint,
        method: impl Into<String>,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint,
            method: method.into(),
            limiter,
            transport,
            options: Vec::new(),
            resolver: None,
            policy: RetryPolicy::default(),
            session: Mutex::new(Session::default()),
            solving: tokio::sync::Mutex::new(()),
        }
    }

    /// Appends fixed options applied to every call.
    #[must_use]
    pub fn with_options(mut self, options: Vec<QueryOption>) -> Self {
        self.options.extend(options);
        self
    }

    /// Enables captcha handling. Without a resolver challenges are surfaced.
    #[must_use]
    pub fn with_captcha_resolver(mut self, resolver: Arc<dyn CaptchaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replaces the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The operation name.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// A snapshot of the parameters accumulated from solved challenges.
    #[must_use]
    pub fn session_params(&self) -> CallParams {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .params
            .clone()
    }

    /// Performs the call and returns the raw `response` payload.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Cancelled`] if `cancel` fires while waiting for the
    ///   limiter, backing off or resolving a challenge
    /// - [`ApiError::Transport`] on network failures and non-200 statuses
    /// - [`ApiError::Decode`] if the body is not an envelope
    /// - [`ApiError::Remote`] for permanent and unresolved challenge errors
    /// - [`ApiError::RetriesExhausted`] past the throttling ceiling
    #[instrument(skip(self, cancel, extra), fields(method = %self.method))]
    pub async fn call(
        &self,
        cancel: &CancellationToken,
        extra: &[QueryOption],
    ) -> Result<Vec<u8>, ApiError> {
        let mut attempt: u32 = 1;
        let mut challenges: u32 = 0;

        loop {
            self.limiter
                .acquire(cancel)
                .await
                .map_err(|error| match error {
                    RateLimitError::Cancelled => ApiError::Cancelled,
                    RateLimitError::Closed => ApiError::LimiterClosed {
                        method: self.method.clone(),
                    },
                })?;

            let (url, seen) = self.request_url(extra)?;
            let body = self
                .transport
                .get(url)
                .await
                .map_err(|source| ApiError::transport(&self.method, source))?;

            let error = match decode_envelope(&body)
                .map_err(|source| ApiError::decode(&self.method, source))?
            {
                Envelope::Success(payload) => {
                    debug!(attempt, bytes = payload.len(), "call succeeded");
                    return Ok(payload);
                }
                Envelope::Failure(error) => error,
            };

            match classify(&error) {
                Classification::Transient => {
                    match self.policy.should_retry(Classification::Transient, attempt) {
                        RetryDecision::Retry { delay, attempt: next } => {
                            debug!(
                                code = %error.code,
                                attempt,
                                delay_ms = delay.as_millis(),
                                "throttled, retrying"
                            );
                            if !delay.is_zero() {
                                tokio::select! {
                                    biased;
                                    () = cancel.cancelled() => return Err(ApiError::Cancelled),
                                    () = tokio::time::sleep(delay) => {}
                                }
                            }
                            attempt = next;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            warn!(attempts = attempt, %reason, "giving up on throttled call");
                            return Err(ApiError::RetriesExhausted {
                                method: self.method.clone(),
                                attempts: attempt,
                                last: error,
                            });
                        }
                    }
                }
                Classification::Challenge => {
                    self.resolve_challenge(cancel, error, seen, &mut challenges)
                        .await?;
                }
                Classification::Permanent => {
                    debug!(code = %error.code, "permanent provider error");
                    return Err(ApiError::remote(&self.method, error));
                }
            }
        }
    }

    /// Performs the call and deserializes the payload.
    ///
    /// # Errors
    ///
    /// Everything [`Caller::call`] returns, plus [`ApiError::Decode`] when
    /// the payload does not match `T`.
    pub async fn call_json<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        extra: &[QueryOption],
    ) -> Result<T, ApiError> {
        let payload = self.call(cancel, extra).await?;
        serde_json::from_slice(&payload).map_err(|source| ApiError::decode(&self.method, source))
    }

    /// Runs the resolver and stores its answer, or returns the error to surface.
    ///
    /// `seen` is the solution count the failed request was built with. If a
    /// concurrent call stored a newer solution meanwhile, that one is retried
    /// without asking again.
    async fn resolve_challenge(
        &self,
        cancel: &CancellationToken,
        error: RemoteError,
        seen: u64,
        rounds: &mut u32,
    ) -> Result<(), ApiError> {
        let Some(resolver) = &self.resolver else {
            debug!("challenge received without a resolver");
            return Err(ApiError::remote(&self.method, error));
        };

        // Held until the answer is stored.
        let _solving = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ApiError::Cancelled),
            guard = self.solving.lock() => guard,
        };
        if self.solutions() != seen {
            debug!("challenge solved by a concurrent call, retrying");
            return Ok(());
        }

        *rounds += 1;
        let round = *rounds;
        if round > self.policy.max_challenges() {
            warn!(rounds = round - 1, "challenge limit reached");
            return Err(ApiError::remote(&self.method, error));
        }
        let Some((sid, image)) = error
            .captcha()
            .map(|(sid, image)| (sid.to_string(), image.to_string()))
        else {
            return Err(ApiError::remote(&self.method, error));
        };

        debug!(challenge = %sid, round, "resolving challenge");
        match resolver.resolve(cancel, &sid, &image).await {
            Ok(key) => {
                let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                session.params.set("captcha_sid", sid);
                session.params.set("captcha_key", key);
                session.solutions += 1;
                Ok(())
            }
            Err(PromptError::Cancelled) => Err(ApiError::Cancelled),
            Err(resolve_error) => {
                warn!(error = %resolve_error, "challenge resolution failed");
                Err(ApiError::remote(&self.method, error))
            }
        }
    }

    fn solutions(&self) -> u64 {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .solutions
    }

    /// `base/method?v=..` followed by fixed, session and per-call parameters,
    /// with the solution count the session parameters belong to.
    fn request_url(&self, extra: &[QueryOption]) -> Result<(Url, u64), ApiError> {
        let mut url = self.endpoint.method_url(&self.method).ok_or_else(|| {
            ApiError::transport(
                &self.method,
                TransportError::invalid_url(redact_url(self.endpoint.base.as_str())),
            )
        })?;

        let mut params = CallParams::new();
        params.set("v", self.endpoint.version.as_str());
        params.apply(&self.options);
        let seen = {
            let session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, value) in session.params.iter() {
                params.set(key, value);
            }
            session.solutions
        };
        params.apply(extra);

        url.query_pairs_mut().extend_pairs(params.iter());
        Ok((url, seen))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::api::error::ErrorCode;
    use crate::api::params::{with_number, with_param};

    /// Replays canned bodies and records the URLs it was asked for.
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        bodies: Mutex<VecDeque<&'static str>>,
        urls: Mutex<Vec<Url>>,
    }

    impl ScriptedTransport {
        fn new(bodies: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                bodies: Mutex::new(bodies.iter().copied().collect()),
                urls: Mutex::default(),
            })
        }

        fn urls(&self) -> Vec<Url> {
            self.urls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn get(&self, url: Url) -> Result<Vec<u8>, TransportError> {
            self.urls.lock().unwrap().push(url.clone());
            match self.bodies.lock().unwrap().pop_front() {
                Some(body) => Ok(body.as_bytes().to_vec()),
                None => Err(TransportError::status(url.as_str(), 500)),
            }
        }
    }

    #[derive(Debug)]
    struct FixedResolver(Result<&'static str, fn() -> PromptError>);

    #[async_trait]
    impl CaptchaResolver for FixedResolver {
        async fn resolve(
            &self,
            _cancel: &CancellationToken,
            _challenge_id: &str,
            _image_url: &str,
        ) -> Result<String, PromptError> {
            self.0.map(str::to_string).map_err(|make| make())
        }
    }

    const THROTTLED: &str = r#"{"error":{"error_code":6,"error_msg":"Too many requests per second"}}"#;
    const CAPTCHA: &str = r#"{"error":{"error_code":14,"error_msg":"Captcha needed","captcha_sid":"777","captcha_img":"https://api.vk.com/captcha.php?sid=777"}}"#;
    const DENIED: &str = r#"{"error":{"error_code":15,"error_msg":"Access denied"}}"#;
    const OK: &str = r#"{"response":[{"id":1}]}"#;

    fn caller(transport: Arc<ScriptedTransport>) -> Caller {
        let endpoint =
            ApiEndpoint::new(Url::parse("https://api.example.test/method").unwrap(), "5.131")
                .unwrap();
        Caller::new(
            endpoint,
            "users.get",
            Arc::new(RateLimiter::unlimited()),
            transport,
        )
        .with_retry_policy(RetryPolicy::default().without_backoff())
    }

    fn query(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    // ==================== Request Construction Tests ====================

    #[tokio::test]
    async fn test_request_url_layers_version_options_and_extra() {
        let transport = ScriptedTransport::new(&[OK]);
        let caller = caller(transport.clone())
            .with_options(vec![with_number("count", 10), with_param("fields", "city")]);
        caller
            .call(&CancellationToken::new(), &[with_number("count", 20)])
            .await
            .unwrap();

        let url = &transport.urls()[0];
        assert_eq!(url.path(), "/method/users.get");
        assert_eq!(query(url, "v").as_deref(), Some("5.131"));
        assert_eq!(query(url, "count").as_deref(), Some("20"));
        assert_eq!(query(url, "fields").as_deref(), Some("city"));
    }

    #[test]
    fn test_endpoint_rejects_malformed_version() {
        let base = Url::parse("https://api.example.test/method").unwrap();
        assert!(matches!(
            ApiEndpoint::new(base, " "),
            Err(ConfigError::InvalidVersion { .. })
        ));
        let opaque = Url::parse("mailto:someone@example.test").unwrap();
        assert!(ApiEndpoint::new(opaque, "5.131").is_err());
    }

    // ==================== Classification Loop Tests ====================

    #[tokio::test]
    async fn test_throttling_is_absorbed() {
        let transport = ScriptedTransport::new(&[THROTTLED, THROTTLED, OK]);
        let payload = caller(transport.clone())
            .call(&CancellationToken::new(), &[])
            .await
            .unwrap();
        assert_eq!(payload, br#"[{"id":1}]"#);
        assert_eq!(transport.urls().len(), 3);
    }

    #[tokio::test]
    async fn test_throttling_ceiling_yields_retries_exhausted() {
        let transport = ScriptedTransport::new(&[THROTTLED, THROTTLED, THROTTLED, OK]);
        let caller = caller(transport.clone())
            .with_retry_policy(RetryPolicy::with_max_transient_retries(2).without_backoff());
        let error = caller.call(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(error, ApiError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transport.urls().len(), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_returned_without_retry() {
        let transport = ScriptedTransport::new(&[DENIED, OK]);
        let error = caller(transport.clone())
            .call(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert_eq!(
            error.remote_error().map(|e| e.code),
            Some(ErrorCode::ACCESS_DENIED)
        );
        assert_eq!(transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_retried() {
        let transport = ScriptedTransport::new(&[]);
        let error = caller(transport.clone())
            .call(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            ApiError::Transport {
                source: TransportError::Status { status: 500, .. },
                ..
            }
        ));
        assert_eq!(transport.urls().len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_body_is_decode_error() {
        let transport = ScriptedTransport::new(&["not json"]);
        let error = caller(transport)
            .call(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::Decode { .. }));
    }

    // ==================== Challenge Tests ====================

    #[tokio::test]
    async fn test_challenge_answer_is_replayed_and_kept() {
        let transport = ScriptedTransport::new(&[CAPTCHA, OK, OK]);
        let caller =
            caller(transport.clone()).with_captcha_resolver(Arc::new(FixedResolver(Ok("abcde"))));
        let cancel = CancellationToken::new();
        caller.call(&cancel, &[]).await.unwrap();
        caller.call(&cancel, &[]).await.unwrap();

        let urls = transport.urls();
        assert_eq!(query(&urls[0], "captcha_key"), None);
        assert_eq!(query(&urls[1], "captcha_key").as_deref(), Some("abcde"));
        assert_eq!(query(&urls[1], "captcha_sid").as_deref(), Some("777"));
        assert_eq!(query(&urls[2], "captcha_key").as_deref(), Some("abcde"));
        assert_eq!(caller.session_params().get_all("captcha_key"), vec!["abcde"]);
    }

    #[tokio::test]
    async fn test_challenge_without_resolver_is_surfaced() {
        let transport = ScriptedTransport::new(&[CAPTCHA]);
        let error = caller(transport)
            .call(&CancellationToken::new(), &[])
            .await
            .unwrap_err();
        assert_eq!(
            error.remote_error().map(|e| e.code),
            Some(ErrorCode::CAPTCHA_REQUIRED)
        );
    }

    #[tokio::test]
    async fn test_failed_resolution_surfaces_challenge() {
        let transport = ScriptedTransport::new(&[CAPTCHA]);
        let caller = caller(transport)
            .with_captcha_resolver(Arc::new(FixedResolver(Err(|| PromptError::Empty))));
        let error = caller.call(&CancellationToken::new(), &[]).await.unwrap_err();
        let remote: &RemoteError = error.remote_error().unwrap();
        assert_eq!(remote.captcha_sid.as_deref(), Some("777"));
    }

    #[tokio::test]
    async fn test_cancelled_resolution_is_cancelled() {
        let transport = ScriptedTransport::new(&[CAPTCHA]);
        let caller = caller(transport)
            .with_captcha_resolver(Arc::new(FixedResolver(Err(|| PromptError::Cancelled))));
        let error = caller.call(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(error.is_cancelled());
    }

    #[tokio::test]
    async fn test_challenge_rounds_are_capped() {
        let transport = ScriptedTransport::new(&[CAPTCHA, CAPTCHA, CAPTCHA, CAPTCHA, OK]);
        let caller =
            caller(transport.clone()).with_captcha_resolver(Arc::new(FixedResolver(Ok("wrong"))));
        let error = caller.call(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(error, ApiError::Remote { .. }));
        assert_eq!(transport.urls().len(), 4);
    }

    /// Answers with a challenge until the request carries a solution.
    #[derive(Debug, Default)]
    struct ChallengeUntilSolved {
        hits: AtomicUsize,
    }

    #[async_trait]
    impl Transport for ChallengeUntilSolved {
        async fn get(&self, url: Url) -> Result<Vec<u8>, TransportError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            let body = if query(&url, "captcha_key").is_some() {
                OK
            } else {
                CAPTCHA
            };
            Ok(body.as_bytes().to_vec())
        }
    }

    /// Takes a while to answer and records how many answers overlapped.
    #[derive(Debug, Default)]
    struct SlowResolver {
        calls: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl CaptchaResolver for SlowResolver {
        async fn resolve(
            &self,
            _cancel: &CancellationToken,
            _challenge_id: &str,
            _image_url: &str,
        ) -> Result<String, PromptError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("abcde".to_string())
        }
    }

    #[tokio::test]
    async fn test_concurrent_challenges_are_solved_once() {
        let transport = Arc::new(ChallengeUntilSolved::default());
        let resolver = Arc::new(SlowResolver::default());
        let endpoint =
            ApiEndpoint::new(Url::parse("https://api.example.test/method").unwrap(), "5.131")
                .unwrap();
        let caller = Arc::new(
            Caller::new(
                endpoint,
                "likes.delete",
                Arc::new(RateLimiter::unlimited()),
                transport.clone(),
            )
            .with_captcha_resolver(resolver.clone())
            .with_retry_policy(RetryPolicy::default().without_backoff()),
        );

        let cancel = CancellationToken::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let caller = Arc::clone(&caller);
                let cancel = cancel.clone();
                tokio::spawn(async move { caller.call(&cancel, &[]).await })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), br#"[{"id":1}]"#);
        }

        assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.peak.load(Ordering::SeqCst), 1);
        assert_eq!(caller.session_params().get("captcha_key"), Some("abcde"));
    }

    #[tokio::test]
    async fn test_cancelled_while_waiting_for_concurrent_solution() {
        let transport = ScriptedTransport::new(&[CAPTCHA]);
        let caller =
            caller(transport).with_captcha_resolver(Arc::new(FixedResolver(Ok("abcde"))));
        let _held = caller.solving.lock().await;

        let cancel = CancellationToken::new();
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });
        let error = caller.call(&cancel, &[]).await.unwrap_err();
        assert!(error.is_cancelled());
        assert!(caller.session_params().is_empty());
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test]
    async fn test_cancelled_before_call_does_not_hit_transport() {
        let transport = ScriptedTransport::new(&[OK]);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = caller(transport.clone()).call(&cancel, &[]).await.unwrap_err();
        assert!(error.is_cancelled());
        assert!(transport.urls().is_empty());
    }

    #[tokio::test]
    async fn test_closed_limiter_is_reported() {
        let transport = ScriptedTransport::new(&[OK]);
        let caller = caller(transport);
        caller.limiter.close();
        let error = caller.call(&CancellationToken::new(), &[]).await.unwrap_err();
        assert!(matches!(error, ApiError::LimiterClosed { .. }));
    }

    #[tokio::test]
    async fn test_call_json_deserializes_payload() {
        #[derive(serde::Deserialize)]
        struct User {
            id: i64,
        }
        let transport = ScriptedTransport::new(&[OK]);
        let users: Vec<User> = caller(transport)
            .call_json(&CancellationToken::new(), &[])
            .await
            .unwrap();
        assert_eq!(users[0].id, 1);
    }
}
