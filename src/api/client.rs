//! Shared call context for one authenticated session.

use std::sync::Arc;

use super::captcha::CaptchaResolver;
use super::executor::{ApiEndpoint, Caller};
use super::paginator::{PageDecoder, Paginator};
use super::params::{QueryOption, with_access_token};
use super::rate_limiter::RateLimiter;
use super::retry::RetryPolicy;
use super::transport::Transport;
use crate::auth::Credential;

/// Hands out [`Caller`]s that share one limiter, transport and credential.
///
/// Every caller made here sends `access_token` when a credential is set and
/// uses the client's captcha resolver and retry policy.
#[derive(Debug, Clone)]
pub struct ApiClient {
    endpoint: ApiEndpoint,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    resolver: Option<Arc<dyn CaptchaResolver>>,
    credential: Option<Credential>,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Creates an unauthenticated client.
    pub fn new(
        endpoint: ApiEndpoint,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            endpoint,
            limiter,
            transport,
            resolver: None,
            credential: None,
            policy: RetryPolicy::default(),
        }
    }

    /// Authenticates every call with `credential`.
    #[must_use]
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Uses `resolver` for captcha challenges.
    #[must_use]
    pub fn with_captcha_resolver(mut self, resolver: Arc<dyn CaptchaResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Replaces the retry policy given to new callers.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// The credential in use, if any.
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    /// The shared limiter.
    #[must_use]
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Creates a caller for `method` with `options` as its fixed parameters.
    #[must_use]
    pub fn caller(&self, method: &str, options: Vec<QueryOption>) -> Caller {
        let mut fixed = Vec::with_capacity(options.len() + 1);
        if let Some(credential) = &self.credential {
            fixed.push(with_access_token(credential));
        }
        fixed.extend(options);

        let caller = Caller::new(
            self.endpoint.clone(),
            method,
            Arc::clone(&self.limiter),
            Arc::clone(&self.transport),
        )
        .with_options(fixed)
        .with_retry_policy(self.policy.clone());

        match &self.resolver {
            Some(resolver) => caller.with_captcha_resolver(Arc::clone(resolver)),
            None => caller,
        }
    }

    /// Creates a paginator over `method`.
    #[must_use]
    pub fn paginate<D: PageDecoder>(
        &self,
        method: &str,
        options: Vec<QueryOption>,
        decoder: D,
    ) -> Paginator<D> {
        Paginator::new(Arc::new(self.caller(method, options)), decoder)
    }
}
