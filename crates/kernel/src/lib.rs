//! Core types for database provisioning: layered settings, the collection
//! manifest, the principal definition, and the contract every server backend
//! implements.

pub mod error;
pub mod manifest;
pub mod secret;
pub mod server;
pub mod settings;

pub use error::ProvisionError;
pub use manifest::{Manifest, ManifestError, NamespaceEntry};
pub use secret::Secret;
pub use server::{Outcome, RoleGrant, Server};
pub use settings::{Principal, Settings};
