//! Route table adapter
//!
//! Manages `Microsoft.Network/routeTables` resources: an ordered list of
//! route entries governing subnet traffic, a BGP propagation flag, and a
//! tag mapping. The list of attached subnets is derived, read-only state.

use super::id::ResourceId;
use super::{normalize_location, ImportAsExistsError, Reconcile};
use crate::azure::client::ArmClient;
use crate::azure::{is_not_found, operation};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const RESOURCE_TYPE: &str = "route_table";

/// Where traffic matching a route gets forwarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextHopType {
    VirtualNetworkGateway,
    VnetLocal,
    Internet,
    VirtualAppliance,
    None,
}

impl NextHopType {
    pub const ALL: [NextHopType; 5] = [
        NextHopType::VirtualNetworkGateway,
        NextHopType::VnetLocal,
        NextHopType::Internet,
        NextHopType::VirtualAppliance,
        NextHopType::None,
    ];

    /// Canonical ARM spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            NextHopType::VirtualNetworkGateway => "VirtualNetworkGateway",
            NextHopType::VnetLocal => "VnetLocal",
            NextHopType::Internet => "Internet",
            NextHopType::VirtualAppliance => "VirtualAppliance",
            NextHopType::None => "None",
        }
    }
}

impl Default for NextHopType {
    fn default() -> Self {
        NextHopType::None
    }
}

impl fmt::Display for NextHopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NextHopType {
    type Err = anyhow::Error;

    /// The service treats next hop types case-insensitively; so do we
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .with_context(|| {
                format!(
                    "unknown next hop type {s:?} (expected one of: VirtualNetworkGateway, \
                     VnetLocal, Internet, VirtualAppliance, None)"
                )
            })
    }
}

impl Serialize for NextHopType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for NextHopType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A single route entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub address_prefix: String,
    pub next_hop_type: NextHopType,
    /// Forwarding address; only meaningful for VirtualAppliance hops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_hop_ip: Option<String>,
}

/// Desired state of a route table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTableConfig {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    #[serde(default)]
    pub disable_bgp_route_propagation: bool,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
}

impl RouteTableConfig {
    /// Superficial validation; everything deeper is deferred to the service
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            bail!("route table name must not be empty");
        }
        if self.resource_group.is_empty() {
            bail!("route table {:?}: resource group must not be empty", self.name);
        }
        if self.location.is_empty() {
            bail!("route table {:?}: location must not be empty", self.name);
        }

        for route in &self.routes {
            if route.name.is_empty() {
                bail!("route table {:?}: route name must not be empty", self.name);
            }
            if route.address_prefix.is_empty() {
                bail!(
                    "route {:?}: address prefix must not be empty",
                    route.name
                );
            }
            if matches!(&route.next_hop_ip, Some(ip) if ip.is_empty()) {
                bail!(
                    "route {:?}: next hop address must not be empty when set",
                    route.name
                );
            }
        }

        Ok(())
    }
}

/// Route table state as read back from the service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteTableState {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub disable_bgp_route_propagation: bool,
    pub routes: Vec<RouteConfig>,
    /// Identifiers of subnets attached to this table (derived, read-only)
    pub subnets: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

// =============================================================================
// Wire shapes
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct RouteTableResource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    #[serde(default)]
    properties: RouteTableProperties,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteTableProperties {
    #[serde(default)]
    routes: Vec<RouteResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    disable_bgp_route_propagation: Option<bool>,
    /// Response-only; attached subnets are never part of a request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    subnets: Option<Vec<SubnetReference>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RouteResource {
    name: String,
    #[serde(default)]
    properties: RouteProperties,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RouteProperties {
    #[serde(default)]
    address_prefix: String,
    #[serde(default)]
    next_hop_type: NextHopType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_hop_ip_address: Option<String>,
}

/// Build the outbound route list. An absent next hop address is omitted
/// from the wire entirely, never sent as an empty string.
fn expand_routes(config: &RouteTableConfig) -> Vec<RouteResource> {
    config
        .routes
        .iter()
        .map(|route| RouteResource {
            name: route.name.clone(),
            properties: RouteProperties {
                address_prefix: route.address_prefix.clone(),
                next_hop_type: route.next_hop_type,
                next_hop_ip_address: route.next_hop_ip.clone().filter(|ip| !ip.is_empty()),
            },
        })
        .collect()
}

fn flatten_routes(routes: Vec<RouteResource>) -> Vec<RouteConfig> {
    routes
        .into_iter()
        .map(|route| RouteConfig {
            name: route.name,
            address_prefix: route.properties.address_prefix,
            next_hop_type: route.properties.next_hop_type,
            next_hop_ip: route.properties.next_hop_ip_address,
        })
        .collect()
}

fn flatten_subnets(subnets: Option<Vec<SubnetReference>>) -> Vec<String> {
    subnets
        .unwrap_or_default()
        .into_iter()
        .map(|subnet| subnet.id)
        .collect()
}

#[derive(Debug, Serialize, Deserialize)]
struct SubnetReference {
    id: String,
}

// =============================================================================
// Handler
// =============================================================================

/// Reconciliation handler for route tables
#[derive(Clone)]
pub struct RouteTables {
    client: ArmClient,
}

impl RouteTables {
    pub fn new(client: ArmClient) -> Self {
        Self { client }
    }

    /// Shared upsert path behind create and update
    async fn apply(&self, desired: &RouteTableConfig) -> Result<String> {
        desired.validate()?;

        let name = &desired.name;
        let resource_group = &desired.resource_group;

        tracing::info!(
            "applying route table {:?} (resource group {:?})",
            name,
            resource_group
        );

        let body = serde_json::to_value(RouteTableResource {
            id: None,
            name: Some(name.clone()),
            location: Some(normalize_location(&desired.location)),
            properties: RouteTableProperties {
                routes: expand_routes(desired),
                disable_bgp_route_propagation: Some(desired.disable_bgp_route_propagation),
                subnets: None,
            },
            tags: desired.tags.clone(),
        })?;

        let url = self.client.route_table_url(resource_group, name);

        let response = self.client.put(&url, &body).await.with_context(|| {
            format!("Error creating/updating route table {name:?} (resource group {resource_group:?})")
        })?;

        operation::wait_for_completion(
            &self.client,
            &format!("create/update of route table {name:?}"),
            response,
        )
        .await
        .with_context(|| {
            format!("Error waiting for route table {name:?} (resource group {resource_group:?})")
        })?;

        let read = self.client.get(&url).await.with_context(|| {
            format!("Error reading route table {name:?} (resource group {resource_group:?}) after apply")
        })?;

        let resource: RouteTableResource =
            serde_json::from_value(read).context("Unexpected route table response shape")?;

        match resource.id {
            Some(id) => {
                tracing::info!("route table {:?} converged as {}", name, id);
                Ok(id)
            }
            None => bail!(
                "cannot read route table {name:?} (resource group {resource_group:?}) id"
            ),
        }
    }
}

#[async_trait]
impl Reconcile for RouteTables {
    type Desired = RouteTableConfig;
    type Observed = RouteTableState;

    async fn create(&self, desired: &RouteTableConfig) -> Result<String> {
        desired.validate()?;

        // Existence probe: a live counterpart must be imported, not adopted
        let url = self
            .client
            .route_table_url(&desired.resource_group, &desired.name);

        match self.client.get(&url).await {
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
                    "Error checking for the existence of route table {:?} (resource group {:?})",
                    desired.name, desired.resource_group
                )))
            }
        }

        self.apply(desired).await
    }

    async fn update(&self, desired: &RouteTableConfig) -> Result<String> {
        self.apply(desired).await
    }

    async fn read(&self, id: &str) -> Result<Option<RouteTableState>> {
        let parsed = ResourceId::parse(id)?;
        let resource_group = parsed.resource_group.clone();
        let name = parsed.require("routeTables")?.to_string();

        let url = self.client.route_table_url(&resource_group, &name);

        let body = match self.client.get(&url).await {
            Ok(body) => body,
            Err(err) if is_not_found(&err) => {
                tracing::debug!("route table {:?} no longer exists", name);
                return Ok(None);
            }
            Err(err) => {
                return Err(err.context(format!("Error reading route table {name:?}")))
            }
        };

        let resource: RouteTableResource =
            serde_json::from_value(body).context("Unexpected route table response shape")?;

        Ok(Some(RouteTableState {
            id: resource.id.unwrap_or_else(|| id.to_string()),
            name,
            resource_group,
            location: resource
                .location
                .map(|l| normalize_location(&l))
                .unwrap_or_default(),
            disable_bgp_route_propagation: resource
                .properties
                .disable_bgp_route_propagation
                .unwrap_or(false),
            routes: flatten_routes(resource.properties.routes),
            subnets: flatten_subnets(resource.properties.subnets),
            tags: resource.tags,
        }))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let parsed = ResourceId::parse(id)?;
        let resource_group = parsed.resource_group.clone();
        let name = parsed.require("routeTables")?.to_string();

        let url = self.client.route_table_url(&resource_group, &name);

        let response = match self.client.delete(&url).await {
            Ok(response) => response,
            Err(err) if is_not_found(&err) => {
                tracing::warn!("route table {:?} was already gone", name);
                return Ok(());
            }
            Err(err) => {
                return Err(err.context(format!(
                    "Error deleting route table {name:?} (resource group {resource_group:?})"
                )))
            }
        };

        operation::wait_for_completion(
            &self.client,
            &format!("deletion of route table {name:?}"),
            response,
        )
        .await
        .with_context(|| {
            format!(
                "Error waiting for deletion of route table {name:?} (resource group {resource_group:?})"
            )
        })
    }
}
