//! Azure AD authentication
//!
//! Issues bearer tokens for ARM calls via the OAuth2 client-credentials
//! flow, with in-memory token caching.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default AAD authority host
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Token audience for Azure Resource Manager
pub const MANAGEMENT_RESOURCE: &str = "https://management.azure.com/";

/// Token expiry buffer - refresh tokens this much before they actually expire
/// This prevents using tokens that are about to expire during a request
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Default token TTL if the token endpoint doesn't report one
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// Source of bearer tokens for ARM calls
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Get an access token for API calls
    async fn token(&self) -> Result<String>;
}

/// Fixed token provider, used by tests and the `ARM_ACCESS_TOKEN` escape hatch
pub struct StaticToken(pub String);

#[async_trait]
impl TokenProvider for StaticToken {
    async fn token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// When this token expires (with buffer applied)
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Service-principal credentials (client-credentials grant) with token caching
pub struct ClientSecretCredentials {
    tenant_id: String,
    client_id: String,
    client_secret: String,
    authority: String,
    resource: String,
    http: reqwest::Client,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

impl ClientSecretCredentials {
    /// Create credentials against the public-cloud authority
    pub fn new(tenant_id: &str, client_id: &str, client_secret: &str) -> Result<Self> {
        Self::with_authority(tenant_id, client_id, client_secret, DEFAULT_AUTHORITY)
    }

    /// Create credentials against a specific authority host (sovereign clouds)
    pub fn with_authority(
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
        authority: &str,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("azrec/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create token HTTP client")?;

        Ok(Self {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            authority: authority.trim_end_matches('/').to_string(),
            resource: MANAGEMENT_RESOURCE.to_string(),
            http,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    async fn fetch_token(&self) -> Result<(String, Duration)> {
        let url = format!("{}/{}/oauth2/token", self.authority, self.tenant_id);

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("resource", self.resource.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .context("Failed to send token request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read token response")?;

        if !status.is_success() {
            // Security: the body can echo the client id; log only the status
            tracing::error!("AAD token request failed: {}", status);
            return Err(anyhow::anyhow!("token request failed: {}", status));
        }

        let parsed: Value =
            serde_json::from_str(&body).context("Failed to parse token response JSON")?;

        let token = parsed
            .get("access_token")
            .and_then(|v| v.as_str())
            .context("token response missing access_token")?
            .to_string();

        // AAD v1 reports expires_in as a decimal string; be lenient about the type
        let ttl = parsed
            .get("expires_in")
            .and_then(|v| {
                v.as_u64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
            })
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_TOKEN_TTL);

        Ok((token, ttl))
    }
}

#[async_trait]
impl TokenProvider for ClientSecretCredentials {
    /// Get an access token, fetching a new one when the cached token expired
    async fn token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let (token, ttl) = self.fetch_token().await?;

        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_BUFFER);

        {
            let mut cache = self.token_cache.write().await;
            *cache = Some(CachedToken {
                token: token.clone(),
                expires_at,
            });
        }

        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            ttl.saturating_sub(TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token)
    }
}
