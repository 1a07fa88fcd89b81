//! Wiring shared by every command: validated config, transport, limiter,
//! and the credential for the run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use vk_client::api::{
    ApiClient, HttpTransport, PromptCaptchaResolver, RateLimitConfig, RateLimiter, RetryPolicy,
    Transport,
};
use vk_client::auth::{App, Authorizer, Credential, GrantType, SystemBrowser};
use vk_client::config::ClientConfig;
use vk_client::prompt::StdinPrompter;

use crate::cli::{AppArgs, LimitArgs};

pub struct Session {
    config: ClientConfig,
    app: AppArgs,
    transport: Arc<dyn Transport>,
    limiter: Arc<RateLimiter>,
}

impl Session {
    pub fn new(app: AppArgs, limits: &LimitArgs) -> Result<Self> {
        let config = client_config(limits);
        config
            .validate()
            .context("Invalid client configuration")?;
        debug!(?config, "client configuration");

        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new_with_timeouts(
            config.connect_timeout,
            config.read_timeout,
        ));
        let limiter = Arc::new(RateLimiter::new(config.rate_limit));
        Ok(Self {
            config,
            app,
            transport,
            limiter,
        })
    }

    pub fn authorizer(&self) -> Result<Authorizer> {
        let client_id = self
            .app
            .client_id
            .clone()
            .ok_or_else(|| anyhow!("--client-id (or VK_CLIENT_ID) is required to authorize"))?;
        let app = App::new(
            client_id,
            self.app.client_secret.clone().unwrap_or_default(),
            self.app.scope,
        );
        let endpoints = self.config.auth_endpoints()?;
        Ok(Authorizer::new(
            app,
            endpoints,
            Arc::new(SystemBrowser),
            Arc::clone(&self.transport),
        )
        .with_redirect_addr(self.config.redirect_host.clone(), self.config.redirect_port))
    }

    /// Uses `--token` when given, otherwise authorizes: the code grant when
    /// a secret is available, the standalone flow without one.
    pub async fn credential(&self, cancel: &CancellationToken) -> Result<Credential> {
        if let Some(token) = &self.app.token {
            return parse_token(token);
        }

        let authorizer = self.authorizer()?;
        let result = if self.app.client_secret.is_some() {
            authorizer.authorize(cancel, GrantType::Code).await
        } else {
            authorizer.authorize_standalone(cancel, &StdinPrompter).await
        };
        let credential = result.context("Authorization failed")?;
        info!(user_id = credential.user_id(), "Authorized");
        Ok(credential)
    }

    pub fn api_client(&self, credential: Credential) -> Result<ApiClient> {
        let client = ApiClient::new(
            self.config.api_endpoint()?,
            Arc::clone(&self.limiter),
            Arc::clone(&self.transport),
        )
        .with_credential(credential)
        .with_captcha_resolver(Arc::new(PromptCaptchaResolver::new(StdinPrompter)))
        .with_retry_policy(self.config.retry.clone());
        Ok(client)
    }
}

pub fn client_config(limits: &LimitArgs) -> ClientConfig {
    let retry = if limits.retry_forever {
        RetryPolicy::unbounded()
    } else {
        RetryPolicy::with_max_transient_retries(limits.max_transient_retries)
    };
    ClientConfig {
        rate_limit: RateLimitConfig {
            interval: Duration::from_millis(limits.rate_interval_ms),
            burst: limits.rate_burst as usize,
        },
        retry,
        ..ClientConfig::default()
    }
}

/// Accepts a bare token or the whole redirect URL it was copied from.
fn parse_token(raw: &str) -> Result<Credential> {
    let raw = raw.trim();
    if raw.contains("access_token=") {
        return Credential::from_redirect_url(raw).context("Invalid token URL");
    }
    if raw.is_empty() {
        return Err(anyhow!("--token is empty"));
    }
    Ok(Credential::new(raw, None, 0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use clap::Parser;

    use crate::cli::Args;

    #[test]
    fn test_client_config_from_flags() {
        let args = Args::try_parse_from([
            "vk",
            "--rate-interval-ms",
            "1000",
            "--rate-burst",
            "5",
            "--max-transient-retries",
            "2",
            "auth",
        ])
        .unwrap();
        let config = client_config(&args.limits);
        assert_eq!(config.rate_limit.interval, Duration::from_secs(1));
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.retry.max_transient_retries(), Some(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_client_config_retry_forever() {
        let args = Args::try_parse_from(["vk", "--retry-forever", "auth"]).unwrap();
        assert_eq!(client_config(&args.limits).retry.max_transient_retries(), None);
    }

    #[test]
    fn test_parse_token_accepts_bare_token_and_url() {
        let credential = parse_token(" abc123 ").unwrap();
        assert_eq!(credential.token(), "abc123");
        assert_eq!(credential.expires_at(), None);

        let credential = parse_token(
            "https://oauth.vk.com/blank.html#access_token=xyz&expires_in=0&user_id=7",
        )
        .unwrap();
        assert_eq!(credential.token(), "xyz");
        assert_eq!(credential.user_id(), 7);

        assert!(parse_token("   ").is_err());
    }
}
