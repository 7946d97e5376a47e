//! ARM Client
//!
//! Main client for Azure Resource Manager, combining authentication,
//! HTTP plumbing, and per-service URL construction.

use super::auth::TokenProvider;
use super::http::{ArmHttpClient, ArmResponse};
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use urlencoding::encode;

/// Default ARM endpoint (public cloud)
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// API version for Microsoft.Network resources
pub const NETWORK_API_VERSION: &str = "2018-04-01";

/// API version for Microsoft.ServiceBus resources
pub const SERVICEBUS_API_VERSION: &str = "2017-04-01";

/// Default delay between polls of a pending operation
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Main ARM client
#[derive(Clone)]
pub struct ArmClient {
    credentials: Arc<dyn TokenProvider>,
    http: ArmHttpClient,
    pub subscription_id: String,
    endpoint: String,
    poll_interval: Duration,
}

impl ArmClient {
    /// Create a new ARM client against the public cloud
    pub fn new(credentials: Arc<dyn TokenProvider>, subscription_id: &str) -> Result<Self> {
        Self::with_endpoint(credentials, subscription_id, DEFAULT_ENDPOINT)
    }

    /// Create a new ARM client against a specific management endpoint
    /// (sovereign clouds, or a mock server in tests)
    pub fn with_endpoint(
        credentials: Arc<dyn TokenProvider>,
        subscription_id: &str,
        endpoint: &str,
    ) -> Result<Self> {
        url::Url::parse(endpoint)
            .with_context(|| format!("Invalid ARM endpoint {endpoint:?}"))?;

        let http = ArmHttpClient::new().context("Failed to create HTTP client")?;

        Ok(Self {
            credentials,
            http,
            subscription_id: subscription_id.to_string(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Override the delay between polls of a pending operation
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Delay between polls of a pending operation
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Get the current access token
    pub async fn get_token(&self) -> Result<String> {
        self.credentials.token().await
    }

    /// Make a GET request to an ARM endpoint
    pub async fn get(&self, url: &str) -> Result<Value> {
        let token = self.get_token().await?;
        Ok(self.http.get(url, &token).await?)
    }

    /// Make a PUT request to an ARM endpoint
    pub async fn put(&self, url: &str, body: &Value) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        Ok(self.http.put(url, &token, body).await?)
    }

    /// Make a POST request to an ARM endpoint
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        let token = self.get_token().await?;
        Ok(self.http.post(url, &token, body).await?)
    }

    /// Make a DELETE request to an ARM endpoint
    pub async fn delete(&self, url: &str) -> Result<ArmResponse> {
        let token = self.get_token().await?;
        Ok(self.http.delete(url, &token).await?)
    }

    fn resource_group_url(&self, resource_group: &str) -> String {
        format!(
            "{}/subscriptions/{}/resourceGroups/{}",
            self.endpoint,
            encode(&self.subscription_id),
            encode(resource_group)
        )
    }

    // =========================================================================
    // Microsoft.Network helpers
    // =========================================================================

    /// Build a Microsoft.Network resource URL
    pub fn network_url(&self, resource_group: &str, path: &str) -> String {
        format!(
            "{}/providers/Microsoft.Network/{}?api-version={}",
            self.resource_group_url(resource_group),
            path,
            NETWORK_API_VERSION
        )
    }

    /// Build a route table URL
    pub fn route_table_url(&self, resource_group: &str, name: &str) -> String {
        self.network_url(resource_group, &format!("routeTables/{}", encode(name)))
    }

    // =========================================================================
    // Microsoft.ServiceBus helpers
    // =========================================================================

    /// Build a Microsoft.ServiceBus resource URL
    pub fn servicebus_url(&self, resource_group: &str, path: &str) -> String {
        format!(
            "{}/providers/Microsoft.ServiceBus/{}?api-version={}",
            self.resource_group_url(resource_group),
            path,
            SERVICEBUS_API_VERSION
        )
    }

    /// Build a topic authorization rule URL
    pub fn topic_authorization_rule_url(
        &self,
        resource_group: &str,
        namespace: &str,
        topic: &str,
        rule: &str,
    ) -> String {
        self.servicebus_url(
            resource_group,
            &format!(
                "namespaces/{}/topics/{}/authorizationRules/{}",
                encode(namespace),
                encode(topic),
                encode(rule)
            ),
        )
    }

    /// Build a topic authorization rule list-keys URL
    pub fn topic_authorization_rule_keys_url(
        &self,
        resource_group: &str,
        namespace: &str,
        topic: &str,
        rule: &str,
    ) -> String {
        self.servicebus_url(
            resource_group,
            &format!(
                "namespaces/{}/topics/{}/authorizationRules/{}/listKeys",
                encode(namespace),
                encode(topic),
                encode(rule)
            ),
        )
    }
}
