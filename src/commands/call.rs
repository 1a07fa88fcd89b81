//! Call command handler: one API method call, payload printed as JSON.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use vk_client::api::{CallParams, with_query};

use super::Session;

pub async fn run_call_command(
    session: &Session,
    cancel: &CancellationToken,
    method: &str,
    params: Vec<(String, String)>,
) -> Result<()> {
    let credential = session.credential(cancel).await?;
    let client = session.api_client(credential)?;

    let query: CallParams = params.into_iter().collect();
    debug!(method, ?query, "Calling method");
    let caller = client.caller(method, vec![with_query(query)]);

    let payload = caller
        .call(cancel, &[])
        .await
        .with_context(|| format!("Call to {method} failed"))?;
    let value: serde_json::Value =
        serde_json::from_slice(&payload).context("Response payload is not JSON")?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
