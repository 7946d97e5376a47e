//! Azure Resource Manager interaction module
//!
//! This module provides the core functionality for talking to the Azure
//! Resource Manager REST API: authentication, HTTP client, URL
//! construction, and long-running-operation polling.
//!
//! # Module Structure
//!
//! - [`auth`] - Azure AD authentication via the client-credentials flow
//! - [`client`] - Main ARM client for making API requests
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operation`] - Polling of asynchronous ARM operations
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use crate::azure::auth::ClientSecretCredentials;
//! use crate::azure::client::ArmClient;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let creds = Arc::new(ClientSecretCredentials::new("tenant", "client", "secret")?);
//!     let client = ArmClient::new(creds, "subscription-id")?;
//!     let table = client.get(&client.route_table_url("my-group", "my-routes")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod http;
pub mod operation;

/// True when an error chain bottoms out in an ARM 404
pub fn is_not_found(err: &anyhow::Error) -> bool {
    err.downcast_ref::<http::ArmError>()
        .map(|e| e.is_not_found())
        .unwrap_or(false)
}
