//! In-process [`Server`] for exercising provisioning without a live MongoDB.
//!
//! Handles share state: [`MemoryServer::connect`] opens another unauthenticated
//! connection to the same data, which is how repeated runs are simulated.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use provision_kernel::{Outcome, Principal, ProvisionError, RoleGrant, Server};

#[derive(Debug, Clone)]
struct StoredUser {
    secret: String,
    roles: Vec<RoleGrant>,
}

#[derive(Debug, Default)]
struct State {
    unreachable: bool,
    stalled: bool,
    users: BTreeMap<(String, String), StoredUser>,
    namespaces: BTreeMap<String, BTreeSet<String>>,
    denied: BTreeSet<String>,
    create_calls: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<State>>,
    identity: Option<String>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server every call fails to reach.
    pub fn unreachable() -> Self {
        let server = Self::new();
        server.state().unreachable = true;
        server
    }

    /// A server that accepts the connection but never answers a ping.
    pub fn stalled() -> Self {
        let server = Self::new();
        server.state().stalled = true;
        server
    }

    /// Refuse collection operations on `namespace` with a privilege error.
    /// Denying the principal's source database also refuses principal creation.
    pub fn deny_namespace(self, namespace: &str) -> Self {
        self.state().denied.insert(namespace.to_string());
        self
    }

    /// Seed an existing principal, as if created by an earlier run.
    pub fn with_principal(
        self,
        name: &str,
        source: &str,
        secret: &str,
        roles: Vec<RoleGrant>,
    ) -> Self {
        self.state().users.insert(
            (source.to_string(), name.to_string()),
            StoredUser {
                secret: secret.to_string(),
                roles,
            },
        );
        self
    }

    /// A fresh, unauthenticated connection to the same data.
    pub fn connect(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            identity: None,
        }
    }

    /// Principal this handle is acting as, if it authenticated.
    pub fn identity(&self) -> Option<&str> {
        self.identity.as_deref()
    }

    /// Collections currently stored in `namespace`.
    pub fn collections(&self, namespace: &str) -> BTreeSet<String> {
        self.state()
            .namespaces
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of collection creation calls received, including no-ops.
    pub fn create_calls(&self) -> usize {
        self.state().create_calls
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reachable_state(&self) -> Result<MutexGuard<'_, State>, ProvisionError> {
        let state = self.state();
        if state.unreachable {
            return Err(ProvisionError::connection("connection refused"));
        }
        Ok(state)
    }
}

fn check_namespace(state: &State, namespace: &str) -> Result<(), ProvisionError> {
    if state.denied.contains(namespace) {
        return Err(ProvisionError::privilege(
            namespace,
            format!("not authorized on {namespace}"),
        ));
    }
    Ok(())
}

#[async_trait]
impl Server for MemoryServer {
    async fn ping(&self) -> Result<(), ProvisionError> {
        let stalled = self.reachable_state()?.stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn create_principal(&self, principal: &Principal) -> Result<Outcome, ProvisionError> {
        let mut state = self.reachable_state()?;
        check_namespace(&state, &principal.source)?;
        let key = (principal.source.clone(), principal.name.clone());
        if state.users.contains_key(&key) {
            return Ok(Outcome::AlreadyPresent);
        }
        state.users.insert(
            key,
            StoredUser {
                secret: principal.secret.expose_secret().clone(),
                roles: principal.roles.clone(),
            },
        );
        Ok(Outcome::Created)
    }

    async fn principal_roles(
        &self,
        name: &str,
        source: &str,
    ) -> Result<Option<Vec<RoleGrant>>, ProvisionError> {
        let state = self.reachable_state()?;
        Ok(state
            .users
            .get(&(source.to_string(), name.to_string()))
            .map(|user| user.roles.clone()))
    }

    async fn authenticate(&mut self, principal: &Principal) -> Result<(), ProvisionError> {
        {
            let state = self.reachable_state()?;
            let key = (principal.source.clone(), principal.name.clone());
            match state.users.get(&key) {
                Some(user) if &user.secret == principal.secret.expose_secret() => {}
                _ => {
                    return Err(ProvisionError::auth(format!(
                        "authentication failed for '{}'",
                        principal.name
                    )))
                }
            }
        }
        self.identity = Some(principal.name.clone());
        Ok(())
    }

    async fn create_collection(
        &self,
        namespace: &str,
        collection: &str,
    ) -> Result<Outcome, ProvisionError> {
        let mut state = self.reachable_state()?;
        check_namespace(&state, namespace)?;
        state.create_calls += 1;

        let inserted = state
            .namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(collection.to_string());

        Ok(if inserted {
            Outcome::Created
        } else {
            Outcome::AlreadyPresent
        })
    }

    async fn list_collections(&self, namespace: &str) -> Result<Vec<String>, ProvisionError> {
        let state = self.reachable_state()?;
        check_namespace(&state, namespace)?;
        Ok(state
            .namespaces
            .get(namespace)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, ProvisionError> {
        let state = self.reachable_state()?;
        let mut names: BTreeSet<String> = state.namespaces.keys().cloned().collect();
        names.extend(state.users.keys().map(|(source, _)| source.clone()));
        Ok(names.into_iter().collect())
    }

    async fn disconnect(&mut self) {
        self.identity = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creation_is_idempotent() {
        let server = MemoryServer::new();
        assert_eq!(
            server.create_collection("BeforeDomainChange", "A").await.unwrap(),
            Outcome::Created
        );
        assert_eq!(
            server.create_collection("BeforeDomainChange", "A").await.unwrap(),
            Outcome::AlreadyPresent
        );
        assert_eq!(server.create_calls(), 2);
    }

    #[tokio::test]
    async fn authenticate_checks_secret() {
        let mut server = MemoryServer::new().with_principal(
            "admin",
            "admin",
            "right",
            vec![RoleGrant::new("root", "admin")],
        );

        let wrong = Principal::new("admin", "wrong");
        assert!(matches!(
            server.authenticate(&wrong).await,
            Err(ProvisionError::Auth { .. })
        ));
        assert_eq!(server.identity(), None);

        server.authenticate(&Principal::new("admin", "right")).await.unwrap();
        assert_eq!(server.identity(), Some("admin"));
    }

    #[tokio::test]
    async fn connections_share_state() {
        let first = MemoryServer::new();
        first.create_collection("AfterDomainChange", "B").await.unwrap();

        let second = first.connect();
        assert_eq!(
            second.list_collections("AfterDomainChange").await.unwrap(),
            vec!["B".to_string()]
        );
    }

    #[tokio::test]
    async fn unreachable_server_fails_every_call() {
        let server = MemoryServer::unreachable();
        assert!(matches!(
            server.ping().await,
            Err(ProvisionError::Connection { .. })
        ));
        assert!(server.list_namespaces().await.is_err());
    }

    #[tokio::test]
    async fn stalled_server_never_answers_ping() {
        let server = MemoryServer::stalled();
        let ping = tokio::time::timeout(std::time::Duration::from_millis(20), server.ping()).await;
        assert!(ping.is_err());
        assert!(server.list_namespaces().await.is_ok());
    }
}
