//! azrec - declarative reconciliation adapters for Azure resources
//!
//! Given a typed desired-state record, each adapter creates, reads,
//! updates, or deletes its remote counterpart through the Azure Resource
//! Manager REST API and reports the resulting state back. The host
//! reconciliation engine owns diffing and planning; this crate owns the
//! field-by-field translation and the CRUD protocol, including existence
//! probes, import-conflict detection, and bounded waits on asynchronous
//! operations.
//!
//! Two resource kinds are covered:
//!
//! - route tables ([`resource::route_table`])
//! - Service Bus topic authorization rules ([`resource::servicebus`])

pub mod azure;
pub mod config;
pub mod resource;
