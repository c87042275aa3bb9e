//! Azure API interaction.
//!
//! This module handles all Azure-related operations:
//! - [`client`] - The [`NetworkClient`] capability the engine is written against
//! - [`arm`] - Resource Manager REST implementation
//! - [`credential`] - Credential selection per authentication method
//! - [`fake`] - In-memory tenant for tests
//! - [`resource_id`] - ARM resource id parsing

pub mod arm;
pub mod client;
pub mod credential;
pub mod fake;
pub mod resource_id;

// Re-export public types and functions
pub use arm::ArmClient;
pub use client::NetworkClient;
pub use credential::{create_credential, verify_credential};
pub use fake::{fake_vnet_id, FakeNetworkClient, FakeOperation};
pub use resource_id::{short_name, ResourceId};
