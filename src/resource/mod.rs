//! Resource reconciliation adapters
//!
//! Each adapter translates a typed desired-state record into ARM request
//! shapes, applies it remotely, and flattens the response back into a
//! state record. Diffing, planning, and lifecycle ordering belong to the
//! host engine; adapters only expose the CRUD contract below.
//!
//! # Architecture
//!
//! - [`id`] - ARM resource identifier parsing (composite keys)
//! - [`route_table`] - Microsoft.Network route tables
//! - [`servicebus`] - Service Bus topic authorization rules

pub mod id;
pub mod route_table;
pub mod servicebus;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

/// Raised when create finds the desired resource already present remotely.
/// The existing resource must be imported into state, never adopted silently.
#[derive(Debug, Error)]
#[error("a {resource_type} with id {id:?} already exists - import it into state instead of recreating it")]
pub struct ImportAsExistsError {
    pub resource_type: &'static str,
    pub id: String,
}

/// CRUD contract between a resource adapter and the host reconciliation engine
#[async_trait]
pub trait Reconcile: Send + Sync {
    /// Typed desired-state record for this resource kind
    type Desired: Send + Sync;
    /// Refreshed state as read back from the service
    type Observed: Send;

    /// Create a brand-new resource and return its canonical identifier.
    /// Fails with [`ImportAsExistsError`] when a resource with the same
    /// composite key already exists remotely.
    async fn create(&self, desired: &Self::Desired) -> Result<String>;

    /// Converge an existing resource on the desired state (idempotent upsert)
    async fn update(&self, desired: &Self::Desired) -> Result<String>;

    /// Refresh state by identifier. `Ok(None)` means the remote counterpart
    /// is gone and the caller should clear its identifier.
    async fn read(&self, id: &str) -> Result<Option<Self::Observed>>;

    /// Delete by identifier. Deleting an already-absent resource succeeds.
    async fn delete(&self, id: &str) -> Result<()>;
}

/// The service reports locations inconsistently ("West US" vs "westus");
/// normalize before persisting or comparing
pub fn normalize_location(location: &str) -> String {
    location.to_lowercase().replace(' ', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_normalization_folds_case_and_spaces() {
        assert_eq!(normalize_location("West US"), "westus");
        assert_eq!(normalize_location("westus"), "westus");
        assert_eq!(
            normalize_location("North Europe"),
            normalize_location("northeurope")
        );
    }

    #[test]
    fn import_error_names_the_existing_resource() {
        let err = ImportAsExistsError {
            resource_type: "route_table",
            id: "/subscriptions/s/resourceGroups/g/providers/Microsoft.Network/routeTables/rt"
                .to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("route_table"));
        assert!(message.contains("routeTables/rt"));
    }
}
