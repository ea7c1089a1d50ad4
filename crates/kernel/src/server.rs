use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ProvisionError;
use crate::settings::Principal;

/// Result of an idempotent creation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Created,
    AlreadyPresent,
}

/// A role granted on a specific database.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleGrant {
    pub role: String,
    pub db: String,
}

impl RoleGrant {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

impl std::fmt::Display for RoleGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

/// Operations a database server must support to be provisioned.
///
/// Every collection-level call takes its namespace explicitly; implementations
/// must not keep an "active database".
#[async_trait]
pub trait Server: Send + Sync {
    /// Verify the server is reachable through its administrative namespace.
    async fn ping(&self) -> Result<(), ProvisionError>;

    /// Create the principal, reporting `AlreadyPresent` if the name is taken.
    async fn create_principal(&self, principal: &Principal) -> Result<Outcome, ProvisionError>;

    /// Role grants currently held by `name`, or `None` if no such principal.
    async fn principal_roles(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Option<Vec<RoleGrant>>, ProvisionError>;

    /// Switch this connection to act as `principal`.
    async fn authenticate(&mut self, principal: &Principal) -> Result<(), ProvisionError>;

    /// Ensure `collection` exists inside `namespace`.
    async fn create_collection(
        &self,
        namespace: &str,
        collection: &str,
    ) -> Result<Outcome, ProvisionError>;

    /// Collection names in `namespace`, sorted.
    async fn list_collections(&self, namespace: &str) -> Result<Vec<String>, ProvisionError>;

    /// Namespaces present on the server, sorted.
    async fn list_namespaces(&self) -> Result<Vec<String>, ProvisionError>;

    /// Release the connection. Called once at the end of a run.
    async fn disconnect(&mut self) {}
}
