//! Auth command handler: run an authorization flow and print the token.

use std::time::SystemTime;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use vk_client::auth::GrantType;
use vk_client::prompt::StdinPrompter;

use super::Session;
use crate::cli::GrantArg;

pub async fn run_auth_command(
    session: &Session,
    cancel: &CancellationToken,
    grant: GrantArg,
) -> Result<()> {
    let authorizer = session.authorizer()?;
    info!(?grant, "Opening the authorization page in the browser");

    let result = match grant {
        GrantArg::Code => authorizer.authorize(cancel, GrantType::Code).await,
        GrantArg::Token => authorizer.authorize(cancel, GrantType::Token).await,
        GrantArg::Standalone => authorizer.authorize_standalone(cancel, &StdinPrompter).await,
    };
    let credential = result.context("Authorization failed")?;

    match credential.expires_at() {
        Some(expires_at) => {
            let secs = expires_at
                .duration_since(SystemTime::now())
                .map(|left| left.as_secs())
                .unwrap_or_default();
            info!(user_id = credential.user_id(), expires_in_secs = secs, "Authorized");
        }
        None => info!(user_id = credential.user_id(), "Authorized with a non-expiring token"),
    }

    // stdout carries only the token so it can be captured into VK_TOKEN.
    println!("{}", credential.token());
    Ok(())
}
