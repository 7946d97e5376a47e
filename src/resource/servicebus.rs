//! Service Bus topic authorization rule adapter
//!
//! Manages access-credential grants scoped to a Service Bus topic. A rule
//! carries a set of rights (Listen/Send/Manage); reading a rule also
//! fetches its connection strings and keys via a separate list-keys call.

use super::id::ResourceId;
use super::{ImportAsExistsError, Reconcile};
use crate::azure::client::ArmClient;
use crate::azure::{is_not_found, operation};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const RESOURCE_TYPE: &str = "servicebus_topic_authorization_rule";

/// Rights granted by an authorization rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rights {
    #[serde(default)]
    pub listen: bool,
    #[serde(default)]
    pub send: bool,
    #[serde(default)]
    pub manage: bool,
}

impl Rights {
    /// The service rejects manage-only grants; catch that locally
    pub fn validate(&self) -> Result<()> {
        if self.manage && !(self.listen && self.send) {
            bail!("a manage grant requires listen and send to be granted as well");
        }
        if !(self.listen || self.send || self.manage) {
            bail!("at least one of listen, send, or manage must be granted");
        }
        Ok(())
    }
}

/// Build the outbound rights list in the service's canonical spelling
fn expand_rights(rights: Rights) -> Vec<String> {
    let mut out = Vec::new();
    if rights.listen {
        out.push("Listen".to_string());
    }
    if rights.send {
        out.push("Send".to_string());
    }
    if rights.manage {
        out.push("Manage".to_string());
    }
    out
}

fn flatten_rights(rights: &[String]) -> Rights {
    let mut out = Rights::default();
    for right in rights {
        match right.as_str() {
            "Listen" => out.listen = true,
            "Send" => out.send = true,
            "Manage" => out.manage = true,
            other => tracing::warn!("ignoring unknown right {:?}", other),
        }
    }
    out
}

/// Desired state of a topic authorization rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAuthorizationRuleConfig {
    pub name: String,
    pub namespace_name: String,
    pub topic_name: String,
    pub resource_group: String,
    #[serde(default)]
    pub rights: Rights,
}

impl TopicAuthorizationRuleConfig {
    /// Superficial validation; everything deeper is deferred to the service
    pub fn validate(&self) -> Result<()> {
        validate_rule_name(&self.name)?;
        validate_namespace_name(&self.namespace_name)?;
        validate_topic_name(&self.topic_name)?;
        if self.resource_group.is_empty() {
            bail!("authorization rule {:?}: resource group must not be empty", self.name);
        }
        self.rights.validate()
    }
}

/// Rule names: 1-50 chars of letters, digits, periods, hyphens, and
/// underscores, starting and ending with a letter or digit
fn validate_rule_name(name: &str) -> Result<()> {
    let valid_inner =
        |c: char| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_';

    if name.is_empty() || name.len() > 50 {
        bail!("authorization rule name {name:?} must be 1-50 characters");
    }
    if !name.chars().all(valid_inner)
        || !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        bail!(
            "authorization rule name {name:?} may only contain letters, digits, periods, \
             hyphens, and underscores, and must start and end with a letter or digit"
        );
    }
    Ok(())
}

/// Namespace names: 6-50 chars of letters, digits, and hyphens, starting
/// with a letter and ending with a letter or digit
fn validate_namespace_name(name: &str) -> Result<()> {
    if name.len() < 6 || name.len() > 50 {
        bail!("namespace name {name:?} must be 6-50 characters");
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-')
        || !name.starts_with(|c: char| c.is_ascii_alphabetic())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        bail!(
            "namespace name {name:?} may only contain letters, digits, and hyphens, must \
             start with a letter, and must end with a letter or digit"
        );
    }
    Ok(())
}

/// Topic names: 1-260 chars of letters, digits, periods, hyphens,
/// underscores, slashes, and tildes, starting and ending with a letter or digit
fn validate_topic_name(name: &str) -> Result<()> {
    let valid_inner = |c: char| {
        c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' || c == '/' || c == '~'
    };

    if name.is_empty() || name.len() > 260 {
        bail!("topic name {name:?} must be 1-260 characters");
    }
    if !name.chars().all(valid_inner)
        || !name.starts_with(|c: char| c.is_ascii_alphanumeric())
        || !name.ends_with(|c: char| c.is_ascii_alphanumeric())
    {
        bail!(
            "topic name {name:?} may only contain letters, digits, periods, hyphens, \
             underscores, slashes, and tildes, and must start and end with a letter or digit"
        );
    }
    Ok(())
}

/// Authorization rule state as read back from the service, including the
/// connection secrets from the list-keys call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicAuthorizationRuleState {
    pub id: String,
    pub name: String,
    pub namespace_name: String,
    pub topic_name: String,
    pub resource_group: String,
    pub rights: Rights,
    pub primary_key: Option<String>,
    pub secondary_key: Option<String>,
    pub primary_connection_string: Option<String>,
    pub secondary_connection_string: Option<String>,
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct AuthorizationRuleResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default)]
    properties: AuthorizationRuleProperties,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AuthorizationRuleProperties {
    #[serde(default)]
    rights: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessKeys {
    #[serde(default)]
    primary_key: Option<String>,
    #[serde(default)]
    secondary_key: Option<String>,
    #[serde(default)]
    primary_connection_string: Option<String>,
    #[serde(default)]
    secondary_connection_string: Option<String>,
}

// =============================================================================
// Handler
// =============================================================================

/// Reconciliation handler for topic authorization rules
#[derive(Clone)]
pub struct TopicAuthorizationRules {
    client: ArmClient,
}

impl TopicAuthorizationRules {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    fn rule_url(&self, config: &TopicAuthorizationRuleConfig) -> String {
        self.client.topic_authorization_rule_url(
            &config.resource_group,
            &config.namespace_name,
            &config.topic_name,
            &config.name,
        )
    }

    /// Shared upsert path behind create and update
    async fn apply(&self, desired: &TopicAuthorizationRuleConfig) -> Result<String> {
        desired.validate()?;

        let name = &desired.name;
        let resource_group = &desired.resource_group;

        tracing::info!(
            "applying authorization rule {:?} on topic {:?} (namespace {:?}, resource group {:?})",
            name,
            desired.topic_name,
            desired.namespace_name,
            resource_group
        );

        let body = serde_json::to_value(AuthorizationRuleResource {
            id: None,
            name: Some(name.clone()),
            properties: AuthorizationRuleProperties {
                rights: expand_rights(desired.rights),
            },
        })?;

        let url = self.rule_url(desired);

        let response = self.client.put(&url, &body).await.with_context(|| {
            format!(
                "Error creating/updating authorization rule {name:?} (resource group {resource_group:?})"
            )
        })?;

        operation::wait_for_completion(
            &self.client,
            &format!("create/update of authorization rule {name:?}"),
            response,
        )
        .await
        .with_context(|| {
            format!(
                "Error waiting for authorization rule {name:?} (resource group {resource_group:?})"
            )
        })?;

        let read = self.client.get(&url).await.with_context(|| {
            format!("Error reading authorization rule {name:?} after apply")
        })?;

        let resource: AuthorizationRuleResource =
            serde_json::from_value(read).context("Unexpected authorization rule response shape")?;

        match resource.id {
            Some(id) => {
                tracing::info!("authorization rule {:?} converged as {}", name, id);
                Ok(id)
            }
            None => bail!(
                "cannot read authorization rule {name:?} (resource group {resource_group:?}) id"
            ),
        }
    }

    /// Composite key out of an opaque rule identifier
    fn parse_rule_id(id: &str) -> Result<(String, String, String, String)> {
        let parsed = ResourceId::parse(id)?;
        let namespace = parsed.require("namespaces")?.to_string();
        let topic = parsed.require("topics")?.to_string();
        let name = parsed.require("authorizationRules")?.to_string();
        Ok((parsed.resource_group, namespace, topic, name))
    }
}

#[async_trait]
impl Reconcile for TopicAuthorizationRules {
    type Desired = TopicAuthorizationRuleConfig;
    type Observed = TopicAuthorizationRuleState;

    async fn create(&self, desired: &TopicAuthorizationRuleConfig) -> Result<String> {
        desired.validate()?;

        // Existence probe: a live counterpart must be imported, not adopted
        match self.client.get(&self.rule_url(desired)).await {
            Ok(existing) => {
                if let Some(id) = existing.get("id").and_then(|v| v.as_str()) {
                    return Err(ImportAsExistsError {
                        resource_type: RESOURCE_TYPE,
                        id: id.to_string(),
                    }
                    .into());
                }
            }
            Err(err) if is_not_found(&err) => {}
            Err(err) => {
                return Err(err.context(format!(
                    "Error checking for the existence of authorization rule {:?} (namespace {:?}, resource group {:?})",
                    desired.name, desired.namespace_name, desired.resource_group
                )))
            }
        }

        self.apply(desired).await
    }

    async fn update(&self, desired: &TopicAuthorizationRuleConfig) -> Result<String> {
        self.apply(desired).await
    }

    async fn read(&self, id: &str) -> Result<Option<TopicAuthorizationRuleState>> {
        let (resource_group, namespace, topic, name) = Self::parse_rule_id(id)?;

        let url = self
            .client
            .topic_authorization_rule_url(&resource_group, &namespace, &topic, &name);

        let body = match self.client.get(&url).await {
            Ok(body) => body,
            Err(err) if is_not_found(&err) => {
                tracing::debug!("authorization rule {:?} no longer exists", name);
                return Ok(None);
            }
            Err(err) => {
                return Err(err.context(format!(
                    "Error reading authorization rule {name:?} (namespace {namespace:?})"
                )))
            }
        };

        let resource: AuthorizationRuleResource =
            serde_json::from_value(body).context("Unexpected authorization rule response shape")?;

        let keys_url = self
            .client
            .topic_authorization_rule_keys_url(&resource_group, &namespace, &topic, &name);

        let keys: AccessKeys = serde_json::from_value(
            self.client.post(&keys_url, None).await.with_context(|| {
                format!("Error listing keys for authorization rule {name:?} (namespace {namespace:?})")
            })?,
        )
        .context("Unexpected list-keys response shape")?;

        Ok(Some(TopicAuthorizationRuleState {
            id: resource.id.unwrap_or_else(|| id.to_string()),
            name,
            namespace_name: namespace,
            topic_name: topic,
            resource_group,
            rights: flatten_rights(&resource.properties.rights),
            primary_key: keys.primary_key,
            secondary_key: keys.secondary_key,
            primary_connection_string: keys.primary_connection_string,
            secondary_connection_string: keys.secondary_connection_string,
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let (resource_group, namespace, topic, name) = Self::parse_rule_id(id)?;

        let url = self
            .client
            .topic_authorization_rule_url(&resource_group, &namespace, &topic, &name);

        let response = match self.client.delete(&url).await {
            Ok(response) => response,
            Err(err) if is_not_found(&err) => {
                tracing::warn!("authorization rule {:?} was already gone", name);
                return Ok(());
            }
            Err(err) => {
                return Err(err.context(format!(
                    "Error deleting authorization rule {name:?} (resource group {resource_group:?})"
                )))
            }
        };

        operation::wait_for_completion(
            &self.client,
            &format!("deletion of authorization rule {name:?}"),
            response,
        )
        .await
        .with_context(|| {
            format!(
                "Error waiting for deletion of authorization rule {name:?} (resource group {resource_group:?})"
            )
        })
    }
}
