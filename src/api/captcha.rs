//! Captcha challenge resolution.

use std::fmt;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::prompt::{PromptError, Prompter};

/// Solves a captcha challenge out of band.
///
/// Called by the call layer at most once per challenge response; the
/// returned text is replayed as `captcha_key` on the retried call.
#[async_trait]
pub trait CaptchaResolver: Send + Sync + fmt::Debug {
    /// Returns the solution for challenge `challenge_id` shown at `image_url`.
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        challenge_id: &str,
        image_url: &str,
    ) -> Result<String, PromptError>;
}

/// Resolves challenges by asking a human through a [`Prompter`].
#[derive(Debug, Clone)]
pub struct PromptCaptchaResolver<P> {
    prompter: P,
}

impl<P: Prompter> PromptCaptchaResolver<P> {
    /// Wraps a prompter.
    pub fn new(prompter: P) -> Self {
        Self { prompter }
    }
}

#[async_trait]
impl<P: Prompter> CaptchaResolver for PromptCaptchaResolver<P> {
    async fn resolve(
        &self,
        cancel: &CancellationToken,
        _challenge_id: &str,
        image_url: &str,
    ) -> Result<String, PromptError> {
        let question = format!("Open {image_url} and enter the captcha:");
        self.prompter.ask(cancel, &question).await
    }
}
