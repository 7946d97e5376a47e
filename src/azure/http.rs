//! HTTP utilities for Azure Resource Manager REST calls

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Header carrying the poll URL of an asynchronous ARM operation
const ASYNC_OPERATION_HEADER: &str = "azure-asyncoperation";

/// Sanitize response body for logging
/// Truncates long responses and strips non-printable characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        format!(
            "{}... [truncated, {} bytes total]",
            &body[..MAX_LOG_BODY_LENGTH],
            body.len()
        )
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| !c.is_ascii_graphic() && c != ' ', "")
}

/// Error raised by the ARM transport layer
#[derive(Debug, Error)]
pub enum ArmError {
    /// The request never produced an HTTP response
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status
    #[error("{status}: {code}: {message}")]
    Api {
        status: StatusCode,
        code: String,
        message: String,
    },
}

impl ArmError {
    /// True when the service reported the resource as absent
    pub fn is_not_found(&self) -> bool {
        matches!(self, ArmError::Api { status, .. } if *status == StatusCode::NOT_FOUND)
    }

    /// Build an API error from the ARM error envelope:
    /// `{"error": {"code": "...", "message": "..."}}`
    fn from_response(status: StatusCode, body: &str) -> Self {
        let envelope: Option<Value> = serde_json::from_str(body).ok();
        let detail = envelope.as_ref().and_then(|v| v.get("error"));

        let code = detail
            .and_then(|e| e.get("code"))
            .and_then(|v| v.as_str())
            .unwrap_or("UnknownError")
            .to_string();

        let message = match detail.and_then(|e| e.get("message")).and_then(|v| v.as_str()) {
            Some(m) => m.to_string(),
            None => {
                tracing::warn!("unparseable ARM error envelope: {}", sanitize_for_log(body));
                sanitize_for_log(body)
            }
        };

        ArmError::Api {
            status,
            code,
            message,
        }
    }
}

/// Outcome of a mutating ARM call. Mutations may complete asynchronously;
/// `poll_url`, when present, tracks the pending operation.
#[derive(Debug)]
pub struct ArmResponse {
    pub status: StatusCode,
    pub poll_url: Option<String>,
    pub retry_after: Option<Duration>,
    pub body: Value,
}

/// HTTP client wrapper for ARM API calls
#[derive(Clone)]
pub struct ArmHttpClient {
    client: Client,
}

impl ArmHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self, ArmError> {
        let client = Client::builder()
            .user_agent(concat!("azrec/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a GET request to an ARM endpoint
    pub async fn get(&self, url: &str, token: &str) -> Result<Value, ArmError> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ArmError::from_response(status, &body));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&body).unwrap_or(Value::Null))
    }

    /// Make a PUT request to an ARM endpoint
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<ArmResponse, ArmError> {
        tracing::debug!("PUT {}", url);

        let response = self
            .client
            .put(url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .json(body)
            .send()
            .await?;

        mutation_response(response).await
    }

    /// Make a POST request to an ARM endpoint
    pub async fn post(
        &self,
        url: &str,
        token: &str,
        body: Option<&Value>,
    ) -> Result<Value, ArmError> {
        tracing::debug!("POST {}", url);

        let mut request = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string());

        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status();
        let response_body = response.text().await?;

        if !status.is_success() {
            tracing::debug!("API error: {} - {}", status, sanitize_for_log(&response_body));
            return Err(ArmError::from_response(status, &response_body));
        }

        if response_body.is_empty() {
            return Ok(Value::Null);
        }

        Ok(serde_json::from_str(&response_body).unwrap_or(Value::Null))
    }

    /// Make a DELETE request to an ARM endpoint
    pub async fn delete(&self, url: &str, token: &str) -> Result<ArmResponse, ArmError> {
        tracing::debug!("DELETE {}", url);

        let response = self
            .client
            .delete(url)
            .bearer_auth(token)
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .send()
            .await?;

        mutation_response(response).await
    }
}

/// Read status, poll headers, and body out of a mutating call's response
async fn mutation_response(response: reqwest::Response) -> Result<ArmResponse, ArmError> {
    let status = response.status();
    let poll_url = extract_poll_url(response.headers());
    let retry_after = extract_retry_after(response.headers());
    let body = response.text().await?;

    if !status.is_success() {
        tracing::debug!("API error: {} - {}", status, sanitize_for_log(&body));
        return Err(ArmError::from_response(status, &body));
    }

    let body = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(&body).unwrap_or(Value::Null)
    };

    Ok(ArmResponse {
        status,
        poll_url,
        retry_after,
        body,
    })
}

/// Pull the asynchronous-operation poll URL out of the response headers.
/// `Azure-AsyncOperation` wins over `Location` when both are present.
fn extract_poll_url(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ASYNC_OPERATION_HEADER)
        .or_else(|| headers.get("location"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn extract_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
