use std::fmt;
use std::time::Duration;

use provision_kernel::{Manifest, NamespaceEntry, Outcome, Principal, ProvisionError, Server};

use crate::report::{
    NamespaceReport, NamespaceStatus, PrincipalReport, ProvisionReport, ServerListing,
    StatusReport,
};

/// Where a run currently stands. Runs only ever move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connected,
    Authenticated,
    Provisioning(String),
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Disconnected => f.write_str("disconnected"),
            Phase::Connected => f.write_str("connected"),
            Phase::Authenticated => f.write_str("authenticated"),
            Phase::Provisioning(namespace) => write!(f, "provisioning({namespace})"),
            Phase::Done => f.write_str("done"),
        }
    }
}

/// Drives a server from an empty deployment to the state a [`Manifest`]
/// describes: principal first, then every collection of every namespace.
pub struct Bootstrapper<'a> {
    manifest: &'a Manifest,
    principal: &'a Principal,
    connect_timeout: Duration,
    phase: Phase,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        manifest: &'a Manifest,
        principal: &'a Principal,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            manifest,
            principal,
            connect_timeout,
            phase: Phase::Disconnected,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Provision everything in the manifest.
    ///
    /// Connection, authentication, and principal conflicts abort the run with
    /// `Err`. A privilege error only abandons its namespace and is recorded in
    /// the report, which then reports failure.
    pub async fn run<S>(&mut self, server: &mut S) -> Result<ProvisionReport, ProvisionError>
    where
        S: Server + ?Sized,
    {
        self.principal.validate()?;
        self.manifest.validate()?;

        self.connect(server).await?;
        let principal = self.ensure_principal(server).await?;

        let manifest = self.manifest;
        let mut namespaces = Vec::with_capacity(manifest.namespaces.len());
        for entry in &manifest.namespaces {
            namespaces.push(self.provision_namespace(server, entry).await?);
        }

        let listing = self.listing(server).await?;
        for namespace in &mut namespaces {
            namespace.collection_count = listing.count(&namespace.name);
        }

        self.advance(Phase::Done);
        Ok(ProvisionReport {
            principal,
            namespaces,
            server_namespaces: listing.namespaces,
        })
    }

    /// Connect and authenticate as the principal, then compare the server
    /// against the manifest without creating anything.
    pub async fn status<S>(&mut self, server: &mut S) -> Result<StatusReport, ProvisionError>
    where
        S: Server + ?Sized,
    {
        self.principal.validate()?;
        self.manifest.validate()?;

        self.connect(server).await?;
        server.authenticate(self.principal).await?;
        self.advance(Phase::Authenticated);

        let manifest = self.manifest;
        let mut namespaces = Vec::with_capacity(manifest.namespaces.len());
        for entry in &manifest.namespaces {
            let status = match server.list_collections(&entry.name).await {
                Ok(present) => NamespaceStatus::observed(entry, present),
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(namespace = %entry.name, error = %e, "cannot list collections");
                    NamespaceStatus::unreadable(entry, &e)
                }
                Err(e) => return Err(e),
            };
            namespaces.push(status);
        }

        let server_namespaces = self.server_namespaces(server).await?;
        self.advance(Phase::Done);
        Ok(StatusReport {
            namespaces,
            server_namespaces,
        })
    }

    async fn connect<S>(&mut self, server: &S) -> Result<(), ProvisionError>
    where
        S: Server + ?Sized,
    {
        tokio::time::timeout(self.connect_timeout, server.ping())
            .await
            .map_err(|_| {
                ProvisionError::connection(format!(
                    "no response within {} ms",
                    self.connect_timeout.as_millis()
                ))
            })??;

        self.advance(Phase::Connected);
        Ok(())
    }

    /// Create the principal if missing, then switch to it.
    ///
    /// Once any user exists, an unauthenticated connection may be refused
    /// `createUser` altogether; that refusal is treated as "maybe present" and
    /// settled by authenticating.
    async fn ensure_principal<S>(
        &mut self,
        server: &mut S,
    ) -> Result<PrincipalReport, ProvisionError>
    where
        S: Server + ?Sized,
    {
        let principal = self.principal;
        let outcome = match server.create_principal(principal).await {
            Ok(outcome) => outcome,
            Err(ProvisionError::Privilege { message, .. }) => {
                tracing::info!(
                    principal = %principal.name,
                    reason = %message,
                    "principal creation refused; verifying existing principal"
                );
                Outcome::AlreadyPresent
            }
            Err(e) => return Err(e),
        };

        match outcome {
            Outcome::Created => {
                tracing::info!(principal = %principal.name, "principal created")
            }
            Outcome::AlreadyPresent => {
                tracing::info!(principal = %principal.name, "principal already present")
            }
        }

        server.authenticate(principal).await?;
        self.advance(Phase::Authenticated);

        if outcome == Outcome::AlreadyPresent {
            self.check_roles(server).await?;
        }

        Ok(PrincipalReport {
            name: principal.name.clone(),
            outcome,
        })
    }

    /// An existing principal must hold every requested role. It is never
    /// altered to match.
    async fn check_roles<S>(&self, server: &S) -> Result<(), ProvisionError>
    where
        S: Server + ?Sized,
    {
        let principal = self.principal;
        let Some(existing) = server
            .principal_roles(&principal.name, &principal.source)
            .await?
        else {
            tracing::warn!(
                principal = %principal.name,
                "principal roles not visible; skipping role check"
            );
            return Ok(());
        };

        let missing: Vec<String> = principal
            .roles
            .iter()
            .filter(|grant| !existing.contains(*grant))
            .map(ToString::to_string)
            .collect();

        if missing.is_empty() {
            return Ok(());
        }

        Err(ProvisionError::PrincipalConflict {
            name: principal.name.clone(),
            missing: missing.join(", "),
        })
    }

    async fn provision_namespace<S>(
        &mut self,
        server: &S,
        entry: &NamespaceEntry,
    ) -> Result<NamespaceReport, ProvisionError>
    where
        S: Server + ?Sized,
    {
        self.advance(Phase::Provisioning(entry.name.clone()));
        let mut report = NamespaceReport::new(&entry.name);

        for collection in &entry.collections {
            match server.create_collection(&entry.name, collection).await {
                Ok(Outcome::Created) => {
                    tracing::info!(
                        namespace = %entry.name,
                        collection = %collection,
                        "collection created"
                    );
                    report.created.push(collection.clone());
                }
                Ok(Outcome::AlreadyPresent) => {
                    tracing::info!(
                        namespace = %entry.name,
                        collection = %collection,
                        "collection already present"
                    );
                    report.already_present.push(collection.clone());
                }
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(
                        namespace = %entry.name,
                        error = %e,
                        "namespace provisioning aborted"
                    );
                    report.fail(&e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    async fn listing<S>(&self, server: &S) -> Result<ServerListing, ProvisionError>
    where
        S: Server + ?Sized,
    {
        let mut counts = Vec::with_capacity(self.manifest.namespaces.len());
        for entry in &self.manifest.namespaces {
            match server.list_collections(&entry.name).await {
                Ok(names) => counts.push((entry.name.clone(), names.len())),
                Err(e) if !e.is_fatal() => {
                    tracing::warn!(namespace = %entry.name, error = %e, "cannot list collections");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(ServerListing {
            namespaces: self.server_namespaces(server).await?,
            counts,
        })
    }

    async fn server_namespaces<S>(&self, server: &S) -> Result<Vec<String>, ProvisionError>
    where
        S: Server + ?Sized,
    {
        match server.list_namespaces().await {
            Ok(names) => Ok(names),
            Err(e) if !e.is_fatal() => {
                tracing::warn!(error = %e, "cannot list namespaces");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    fn advance(&mut self, next: Phase) {
        tracing::debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }
}
