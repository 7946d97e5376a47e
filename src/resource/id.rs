//! ARM resource identifiers
//!
//! Azure addresses resources with opaque hierarchical path strings:
//!
//! ```text
//! /subscriptions/{sub}/resourceGroups/{group}/providers/{namespace}/{type}/{name}/...
//! ```
//!
//! The trailing segments encode the resource's composite key. Adapters
//! parse identifiers rather than storing key parts separately.

use anyhow::{bail, Result};
use std::str::FromStr;

/// A parsed ARM resource identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    /// Provider namespace, e.g. `Microsoft.Network`
    pub provider: Option<String>,
    path: Vec<(String, String)>,
}

impl ResourceId {
    /// Parse an ARM identifier into its composite key
    pub fn parse(id: &str) -> Result<Self> {
        let trimmed = id.trim_matches('/');
        if trimmed.is_empty() {
            bail!("resource id is empty");
        }

        let components: Vec<&str> = trimmed.split('/').collect();
        if components.len() % 2 != 0 {
            bail!("resource id {id:?} has an odd number of path segments");
        }

        let mut subscription_id = None;
        let mut resource_group = None;
        let mut provider = None;
        let mut path = Vec::new();

        for pair in components.chunks(2) {
            let (key, value) = (pair[0], pair[1]);
            if key.is_empty() || value.is_empty() {
                bail!("resource id {id:?} contains an empty path segment");
            }

            match key {
                "subscriptions" => subscription_id = Some(value.to_string()),
                "resourceGroups" => resource_group = Some(value.to_string()),
                "providers" => provider = Some(value.to_string()),
                _ => path.push((key.to_string(), value.to_string())),
            }
        }

        let Some(subscription_id) = subscription_id else {
            bail!("resource id {id:?} is missing the subscriptions segment");
        };
        let Some(resource_group) = resource_group else {
            bail!("resource id {id:?} is missing the resourceGroups segment");
        };

        Ok(Self {
            subscription_id,
            resource_group,
            provider,
            path,
        })
    }

    /// Value of a trailing path segment, e.g. `path("routeTables")`
    pub fn path(&self, key: &str) -> Option<&str> {
        self.path
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Like [`Self::path`], failing when the segment is missing
    pub fn require(&self, key: &str) -> Result<&str> {
        match self.path(key) {
            Some(value) => Ok(value),
            None => bail!("resource id is missing the {key:?} segment"),
        }
    }
}

impl FromStr for ResourceId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROUTE_TABLE_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000\
                                  /resourceGroups/group1/providers/Microsoft.Network\
                                  /routeTables/rt1";

    const RULE_ID: &str = "/subscriptions/00000000-0000-0000-0000-000000000000\
                           /resourceGroups/group1/providers/Microsoft.ServiceBus\
                           /namespaces/ns1/topics/topic1/authorizationRules/rule1";

    #[test]
    fn parses_route_table_id() {
        let id = ResourceId::parse(ROUTE_TABLE_ID).unwrap();
        assert_eq!(id.subscription_id, "00000000-0000-0000-0000-000000000000");
        assert_eq!(id.resource_group, "group1");
        assert_eq!(id.provider.as_deref(), Some("Microsoft.Network"));
        assert_eq!(id.path("routeTables"), Some("rt1"));
    }

    #[test]
    fn parses_nested_authorization_rule_id() {
        let id = ResourceId::parse(RULE_ID).unwrap();
        assert_eq!(id.path("namespaces"), Some("ns1"));
        assert_eq!(id.path("topics"), Some("topic1"));
        assert_eq!(id.path("authorizationRules"), Some("rule1"));
    }

    #[test]
    fn require_reports_missing_segment() {
        let id = ResourceId::parse(ROUTE_TABLE_ID).unwrap();
        assert!(id.require("routeTables").is_ok());
        assert!(id.require("topics").is_err());
    }

    #[test]
    fn rejects_malformed_ids() {
        assert!(ResourceId::parse("").is_err());
        assert!(ResourceId::parse("/subscriptions").is_err());
        assert!(ResourceId::parse("/subscriptions/sub/resourceGroups").is_err());
        assert!(ResourceId::parse("/resourceGroups/group1/routeTables/rt1").is_err());
        assert!(ResourceId::parse("/subscriptions//resourceGroups/group1").is_err());
    }

    #[test]
    fn round_trips_through_from_str() {
        let id: ResourceId = ROUTE_TABLE_ID.parse().unwrap();
        assert_eq!(id.resource_group, "group1");
    }
}
