//! Configuration Management
//!
//! Credential and subscription selection for the ARM client. The process
//! environment wins over the config file, which wins over defaults.

use crate::azure::auth::{ClientSecretCredentials, StaticToken, TokenProvider};
use crate::azure::client::ArmClient;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    /// Target subscription
    #[serde(default)]
    pub subscription_id: Option<String>,
    /// AAD tenant for the client-credentials flow
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Service principal application id
    #[serde(default)]
    pub client_id: Option<String>,
    /// Service principal secret (prefer ARM_CLIENT_SECRET over the file)
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Management endpoint override (sovereign clouds)
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ProviderConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("azrec").join("config.json"))
    }

    /// Load configuration from disk
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let Some(path) = Self::config_path() else {
            return Ok(());
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    fn env_or(stored: &Option<String>, vars: &[&str]) -> Option<String> {
        for var in vars {
            if let Ok(value) = std::env::var(var) {
                if !value.is_empty() {
                    return Some(value);
                }
            }
        }
        stored.clone()
    }

    /// Effective subscription (env > config file)
    pub fn effective_subscription(&self) -> Option<String> {
        Self::env_or(
            &self.subscription_id,
            &["ARM_SUBSCRIPTION_ID", "AZURE_SUBSCRIPTION_ID"],
        )
    }

    /// Effective tenant (env > config file)
    pub fn effective_tenant(&self) -> Option<String> {
        Self::env_or(&self.tenant_id, &["ARM_TENANT_ID", "AZURE_TENANT_ID"])
    }

    /// Effective client id (env > config file)
    pub fn effective_client_id(&self) -> Option<String> {
        Self::env_or(&self.client_id, &["ARM_CLIENT_ID", "AZURE_CLIENT_ID"])
    }

    /// Effective client secret (env > config file)
    pub fn effective_client_secret(&self) -> Option<String> {
        Self::env_or(
            &self.client_secret,
            &["ARM_CLIENT_SECRET", "AZURE_CLIENT_SECRET"],
        )
    }

    /// Effective management endpoint (env > config file > public cloud)
    pub fn effective_endpoint(&self) -> Option<String> {
        Self::env_or(&self.endpoint, &["ARM_ENDPOINT"])
    }

    /// Build an ARM client from this configuration. `ARM_ACCESS_TOKEN`
    /// short-circuits the client-credentials flow with a fixed token.
    pub fn build_client(&self) -> Result<ArmClient> {
        let subscription = self.effective_subscription().context(
            "No subscription configured. Set ARM_SUBSCRIPTION_ID or add subscription_id to the config file",
        )?;

        let credentials: Arc<dyn TokenProvider> = match std::env::var("ARM_ACCESS_TOKEN") {
            Ok(token) if !token.is_empty() => Arc::new(StaticToken(token)),
            _ => {
                let tenant = self.effective_tenant().context(
                    "No tenant configured. Set ARM_TENANT_ID or add tenant_id to the config file",
                )?;
                let client_id = self.effective_client_id().context(
                    "No client id configured. Set ARM_CLIENT_ID or add client_id to the config file",
                )?;
                let client_secret = self.effective_client_secret().context(
                    "No client secret configured. Set ARM_CLIENT_SECRET or add client_secret to the config file",
                )?;
                Arc::new(ClientSecretCredentials::new(
                    &tenant,
                    &client_id,
                    &client_secret,
                )?)
            }
        };

        match self.effective_endpoint() {
            Some(endpoint) => ArmClient::with_endpoint(credentials, &subscription, &endpoint),
            None => ArmClient::new(credentials, &subscription),
        }
    }
}
