//! Long-running operations
//!
//! ARM mutations may answer 201/202 with an `Azure-AsyncOperation` (or
//! `Location`) header; completion is observed by polling that URL until a
//! terminal status is reached. Every wait is bounded by a fixed 30-minute
//! deadline.

use super::client::ArmClient;
use super::http::ArmResponse;
use anyhow::{Context, Result};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Deadline for a single create/update/delete to reach a terminal state
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Terminal failure reported by the operation endpoint
#[derive(Debug, Error)]
#[error("operation finished with status {status}: {message}")]
pub struct OperationFailed {
    pub status: String,
    pub message: String,
}

/// Wait for a mutating call to reach a terminal state.
///
/// A 2xx response without an operation header means the call completed
/// synchronously and there is nothing to wait for.
pub async fn wait_for_completion(
    client: &ArmClient,
    operation: &str,
    response: ArmResponse,
) -> Result<()> {
    let Some(poll_url) = response.poll_url else {
        tracing::debug!("{} completed synchronously ({})", operation, response.status);
        return Ok(());
    };

    let first_delay = response.retry_after.unwrap_or_else(|| client.poll_interval());

    tokio::time::timeout(
        OPERATION_TIMEOUT,
        poll_until_done(client, operation, &poll_url, first_delay),
    )
    .await
    .map_err(|_| anyhow::anyhow!("timed out waiting for {}", operation))?
}

async fn poll_until_done(
    client: &ArmClient,
    operation: &str,
    poll_url: &str,
    first_delay: Duration,
) -> Result<()> {
    let mut delay = first_delay;

    loop {
        tokio::time::sleep(delay).await;
        delay = client.poll_interval();

        let body = client
            .get(poll_url)
            .await
            .with_context(|| format!("Error polling status of {operation}"))?;

        match operation_status(&body).as_deref() {
            Some("Succeeded") => {
                tracing::debug!("{} succeeded", operation);
                return Ok(());
            }
            Some(terminal @ ("Failed" | "Canceled")) => {
                return Err(OperationFailed {
                    status: terminal.to_string(),
                    message: failure_message(&body),
                }
                .into());
            }
            Some(pending) => {
                tracing::debug!("{} still pending (status: {})", operation, pending);
            }
            // No status in the body: a Location-style poll that answered with
            // the finished resource itself
            None => {
                tracing::debug!("{} finished without an operation status", operation);
                return Ok(());
            }
        }
    }
}

/// Status from an operation body, falling back to the resource's
/// provisioning state when polling the resource itself
fn operation_status(body: &Value) -> Option<String> {
    body.get("status")
        .or_else(|| body.get("properties").and_then(|p| p.get("provisioningState")))
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn failure_message(body: &Value) -> String {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|v| v.as_str())
        .unwrap_or("no error detail reported")
        .to_string()
}
