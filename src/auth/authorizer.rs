//! Browser-driven authorization flow.
//!
//! # Overview
//!
//! [`Authorizer::authorize`] runs the loopback flow:
//!
//! 1. bind a [`RedirectListener`] on an ephemeral loopback port,
//! 2. open the provider's authorization page, redirecting to the listener,
//! 3. wait for the redirect (or cancellation),
//! 4. read the token from the redirect, or exchange the code for one.
//!
//! [`Authorizer::authorize_standalone`] skips the listener: the provider
//! redirects to its own blank page and the human pastes the final URL.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vk_client::api::HttpTransport;
//! use vk_client::auth::{App, Authorizer, GrantType, Scope, SystemBrowser};
//! use vk_client::config::ClientConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = App::new("51234567", "app-secret", Scope::FRIENDS | Scope::OFFLINE);
//! let authorizer = Authorizer::new(
//!     app,
//!     ClientConfig::default().auth_endpoints()?,
//!     Arc::new(SystemBrowser),
//!     Arc::new(HttpTransport::new()),
//! );
//! let credential = authorizer.authorize(&CancellationToken::new(), GrantType::Code).await?;
//! println!("authorized user {}", credential.user_id());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::distributions::Alphanumeric;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::browser::BrowserLauncher;
use super::credential::{Credential, TokenResponse, check_redirect_error, fragment_params};
use super::error::AuthError;
use super::listener::{DEFAULT_REDIRECT_HOST, RedirectListener};
use super::scope::Scope;
use crate::api::{CallParams, Transport};
use crate::prompt::Prompter;

const STATE_LEN: usize = 32;

/// Application registration used during authorization.
#[derive(Clone)]
pub struct App {
    /// Application id.
    pub client_id: String,
    /// Application secret, needed only for the code exchange.
    pub client_secret: String,
    /// Requested permissions.
    pub scope: Scope,
}

impl App {
    /// Creates an app description.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>, scope: Scope) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scope,
        }
    }
}

impl fmt::Debug for App {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("scope", &self.scope)
            .finish()
    }
}

/// Provider endpoints used by the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    /// Browser-facing authorization page.
    pub authorize: Url,
    /// Server-facing code exchange endpoint.
    pub access_token: Url,
    /// The provider's own landing page for the standalone flow.
    pub standalone_redirect: Url,
    /// Protocol version sent as `v`.
    pub version: String,
}

/// Which credential shape the provider should redirect with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    /// An authorization code, exchanged for a token with the app secret.
    Code,
    /// The token itself, carried in the redirect fragment and relayed to
    /// the loopback listener by the page it serves.
    Token,
}

impl GrantType {
    /// The `response_type` value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Token => "token",
        }
    }
}

/// Progress of one authorization run, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing started yet.
    Idle,
    /// The loopback listener is bound.
    ListenerStarted,
    /// The browser was pointed at the authorization page.
    BrowserLaunched,
    /// Waiting for the provider to redirect back.
    AwaitingRedirect,
    /// The redirect arrived.
    RedirectReceived,
    /// Exchanging the code for a token.
    CodeExchangePending,
    /// A credential was issued.
    Authorized,
    /// The run failed.
    Failed,
    /// The caller cancelled the run.
    Cancelled,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::ListenerStarted => "listener-started",
            Self::BrowserLaunched => "browser-launched",
            Self::AwaitingRedirect => "awaiting-redirect",
            Self::RedirectReceived => "redirect-received",
            Self::CodeExchangePending => "code-exchange-pending",
            Self::Authorized => "authorized",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Tracks the current [`AuthState`] for logging.
#[derive(Debug)]
struct StateLog(AuthState);

impl StateLog {
    fn advance(&mut self, next: AuthState) {
        debug!(from = %self.0, to = %next, "authorization state");
        self.0 = next;
    }

    fn finish<T>(&mut self, result: &Result<T, AuthError>) {
        match result {
            Ok(_) => self.advance(AuthState::Authorized),
            Err(error) if error.is_cancelled() => self.advance(AuthState::Cancelled),
            Err(error) => {
                warn!(state = %self.0, %error, "authorization failed");
                self.advance(AuthState::Failed);
            }
        }
    }
}

/// Runs authorization flows for one app.
#[derive(Debug, Clone)]
pub struct Authorizer {
    app: App,
    endpoints: AuthEndpoints,
    launcher: Arc<dyn BrowserLauncher>,
    transport: Arc<dyn Transport>,
    redirect_host: String,
    redirect_port: u16,
}

impl Authorizer {
    /// Creates an authorizer listening on `127.0.0.1` with an ephemeral port.
    pub fn new(
        app: App,
        endpoints: AuthEndpoints,
        launcher: Arc<dyn BrowserLauncher>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            app,
            endpoints,
            launcher,
            transport,
            redirect_host: DEFAULT_REDIRECT_HOST.to_string(),
            redirect_port: 0,
        }
    }

    /// Binds the redirect listener to `host:port` instead.
    #[must_use]
    pub fn with_redirect_addr(mut self, host: impl Into<String>, port: u16) -> Self {
        self.redirect_host = host.into();
        self.redirect_port = port;
        self
    }

    /// Runs the loopback flow and returns the issued credential.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if `cancel` fires at any wait
    /// - [`AuthError::RedirectDenied`] if the provider redirected with an error
    /// - [`AuthError::StateMismatch`] if the redirect is not ours
    /// - listener, browser and exchange failures
    #[instrument(skip(self, cancel), fields(client_id = %self.app.client_id))]
    pub async fn authorize(
        &self,
        cancel: &CancellationToken,
        grant: GrantType,
    ) -> Result<Credential, AuthError> {
        let mut state = StateLog(AuthState::Idle);
        let result = self.run_loopback(cancel, grant, &mut state).await;
        state.finish(&result);
        if result.is_ok() {
            info!("authorization complete");
        }
        result
    }

    async fn run_loopback(
        &self,
        cancel: &CancellationToken,
        grant: GrantType,
        state: &mut StateLog,
    ) -> Result<Credential, AuthError> {
        let listener = RedirectListener::bind(&self.redirect_host, self.redirect_port).await?;
        let redirect_uri = listener.redirect_uri();
        state.advance(AuthState::ListenerStarted);

        let nonce = random_state();
        let url = self.authorization_url(&redirect_uri, grant, &nonce);
        self.launcher.open(cancel, url.as_str()).await?;
        state.advance(AuthState::BrowserLaunched);

        state.advance(AuthState::AwaitingRedirect);
        let request = listener.wait(cancel).await?;
        state.advance(AuthState::RedirectReceived);

        verify_redirect(&request.params, &nonce)?;
        match grant {
            GrantType::Token => Credential::from_redirect_params(&request.params),
            GrantType::Code => {
                let code = request
                    .params
                    .get("code")
                    .filter(|code| !code.is_empty())
                    .ok_or(AuthError::MissingParameter { name: "code" })?;
                state.advance(AuthState::CodeExchangePending);
                self.exchange_code(&redirect_uri, code).await
            }
        }
    }

    /// Runs the paste-the-URL flow for apps without a reachable redirect.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Cancelled`] if `cancel` fires while the browser or
    ///   prompt is waiting
    /// - [`AuthError::RedirectDenied`] if the pasted URL carries an error
    /// - [`AuthError::InvalidUrl`] and parameter errors for a bad paste
    #[instrument(skip(self, cancel, prompter), fields(client_id = %self.app.client_id))]
    pub async fn authorize_standalone(
        &self,
        cancel: &CancellationToken,
        prompter: &dyn Prompter,
    ) -> Result<Credential, AuthError> {
        let mut state = StateLog(AuthState::Idle);
        let result = self.run_standalone(cancel, prompter, &mut state).await;
        state.finish(&result);
        result
    }

    async fn run_standalone(
        &self,
        cancel: &CancellationToken,
        prompter: &dyn Prompter,
        state: &mut StateLog,
    ) -> Result<Credential, AuthError> {
        let nonce = random_state();
        let url = self.authorization_url(
            self.endpoints.standalone_redirect.as_str(),
            GrantType::Token,
            &nonce,
        );
        self.launcher.open(cancel, url.as_str()).await?;
        state.advance(AuthState::BrowserLaunched);

        state.advance(AuthState::AwaitingRedirect);
        let pasted = prompter
            .ask(cancel, "Copy and paste url from browser:")
            .await?;
        state.advance(AuthState::RedirectReceived);

        let params = fragment_params(&pasted)?;
        verify_redirect(&params, &nonce)?;
        Credential::from_redirect_params(&params)
    }

    /// `authorize?v&client_id&redirect_uri&scope&response_type&display&state`.
    #[must_use]
    pub fn authorization_url(&self, redirect_uri: &str, grant: GrantType, state: &str) -> Url {
        let mut url = self.endpoints.authorize.clone();
        url.query_pairs_mut()
            .append_pair("v", &self.endpoints.version)
            .append_pair("client_id", &self.app.client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &self.app.scope.to_string())
            .append_pair("response_type", grant.as_str())
            .append_pair("display", "page")
            .append_pair("state", state);
        url
    }

    /// Trades an authorization code for a credential.
    async fn exchange_code(&self, redirect_uri: &str, code: &str) -> Result<Credential, AuthError> {
        let mut url = self.endpoints.access_token.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.app.client_id)
            .append_pair("client_secret", &self.app.client_secret)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("code", code);

        let body = self.transport.get(url).await?;
        let response: TokenResponse = serde_json::from_slice(&body)?;
        Credential::from_token_response(response)
    }
}

/// Rejects provider errors and redirects answering someone else's request.
fn verify_redirect(params: &CallParams, expected_state: &str) -> Result<(), AuthError> {
    check_redirect_error(params)?;
    match params.get("state") {
        Some(state) if state != expected_state => Err(AuthError::StateMismatch),
        _ => Ok(()),
    }
}

fn random_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(STATE_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_redirect_checks_error_then_state() {
        let denied: CallParams = [("error", "access_denied"), ("state", "other")]
            .into_iter()
            .collect();
        assert!(matches!(
            verify_redirect(&denied, "mine"),
            Err(AuthError::RedirectDenied { .. })
        ));

        let foreign: CallParams = [("code", "c"), ("state", "other")].into_iter().collect();
        assert!(matches!(
            verify_redirect(&foreign, "mine"),
            Err(AuthError::StateMismatch)
        ));

        let ours: CallParams = [("code", "c"), ("state", "mine")].into_iter().collect();
        assert!(verify_redirect(&ours, "mine").is_ok());
        let stateless: CallParams = [("code", "c")].into_iter().collect();
        assert!(verify_redirect(&stateless, "mine").is_ok());
    }

    #[test]
    fn test_random_state_is_alphanumeric() {
        let state = random_state();
        assert_eq!(state.len(), STATE_LEN);
        assert!(state.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(state, random_state());
    }

    #[test]
    fn test_auth_state_display() {
        assert_eq!(AuthState::CodeExchangePending.to_string(), "code-exchange-pending");
        assert_eq!(GrantType::Token.as_str(), "token");
    }
}
