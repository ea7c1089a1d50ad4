//! Operator-facing summaries of a provisioning run.

use std::fmt;

use serde::Serialize;

use provision_kernel::{NamespaceEntry, Outcome, ProvisionError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub code: String,
    pub message: String,
}

impl From<&ProvisionError> for Failure {
    fn from(error: &ProvisionError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PrincipalReport {
    pub name: String,
    pub outcome: Outcome,
}

/// What happened to one namespace during a run.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceReport {
    pub name: String,
    pub created: Vec<String>,
    pub already_present: Vec<String>,
    pub failure: Option<Failure>,
    /// Collections found on the server afterwards; `None` if they could not be listed.
    pub collection_count: Option<usize>,
}

impl NamespaceReport {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            created: Vec::new(),
            already_present: Vec::new(),
            failure: None,
            collection_count: None,
        }
    }

    pub fn fail(&mut self, error: &ProvisionError) {
        self.failure = Some(Failure::from(error));
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub principal: PrincipalReport,
    pub namespaces: Vec<NamespaceReport>,
    /// Every namespace on the server after the run.
    pub server_namespaces: Vec<String>,
}

impl ProvisionReport {
    /// True when no namespace was abandoned.
    pub fn is_success(&self) -> bool {
        self.namespaces.iter().all(|ns| ns.failure.is_none())
    }

    pub fn created_total(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.created.len()).sum()
    }

    pub fn already_present_total(&self) -> usize {
        self.namespaces.iter().map(|ns| ns.already_present.len()).sum()
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let principal_state = match self.principal.outcome {
            Outcome::Created => "created",
            Outcome::AlreadyPresent => "already present",
        };
        writeln!(f, "principal {}: {}", self.principal.name, principal_state)?;

        for ns in &self.namespaces {
            write!(
                f,
                "{}: {} created, {} already present",
                ns.name,
                ns.created.len(),
                ns.already_present.len()
            )?;
            match ns.collection_count {
                Some(count) => writeln!(f, ", {count} collections on server")?,
                None => writeln!(f, ", collection count unavailable")?,
            }
            for name in &ns.created {
                writeln!(f, "  + {name}")?;
            }
            for name in &ns.already_present {
                writeln!(f, "  = {name}")?;
            }
            if let Some(failure) = &ns.failure {
                writeln!(f, "  ! aborted: {}", failure.message)?;
            }
        }

        write!(f, "server namespaces: {}", self.server_namespaces.join(", "))
    }
}

/// Collection listing gathered at the end of a run.
#[derive(Debug, Clone, Default)]
pub(crate) struct ServerListing {
    pub namespaces: Vec<String>,
    pub counts: Vec<(String, usize)>,
}

impl ServerListing {
    pub fn count(&self, namespace: &str) -> Option<usize> {
        self.counts
            .iter()
            .find(|(name, _)| name == namespace)
            .map(|(_, count)| *count)
    }
}

/// Server state of one manifest namespace, observed without changing it.
#[derive(Debug, Clone, Serialize)]
pub struct NamespaceStatus {
    pub name: String,
    pub expected: usize,
    pub present: Option<Vec<String>>,
    pub missing: Vec<String>,
    pub failure: Option<Failure>,
}

impl NamespaceStatus {
    pub fn observed(entry: &NamespaceEntry, present: Vec<String>) -> Self {
        let missing = entry
            .collections
            .iter()
            .filter(|name| !present.contains(*name))
            .cloned()
            .collect();

        Self {
            name: entry.name.clone(),
            expected: entry.collections.len(),
            present: Some(present),
            missing,
            failure: None,
        }
    }

    pub fn unreadable(entry: &NamespaceEntry, error: &ProvisionError) -> Self {
        Self {
            name: entry.name.clone(),
            expected: entry.collections.len(),
            present: None,
            missing: Vec::new(),
            failure: Some(Failure::from(error)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub namespaces: Vec<NamespaceStatus>,
    pub server_namespaces: Vec<String>,
}

impl StatusReport {
    /// True when every manifest collection was seen on the server.
    pub fn is_complete(&self) -> bool {
        self.namespaces
            .iter()
            .all(|ns| ns.failure.is_none() && ns.missing.is_empty())
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ns in &self.namespaces {
            match (&ns.present, &ns.failure) {
                (Some(present), _) => writeln!(
                    f,
                    "{}: {} collections, {} of {} expected missing",
                    ns.name,
                    present.len(),
                    ns.missing.len(),
                    ns.expected
                )?,
                (None, Some(failure)) => {
                    writeln!(f, "{}: unreadable: {}", ns.name, failure.message)?
                }
                (None, None) => writeln!(f, "{}: unreadable", ns.name)?,
            }
            for name in &ns.missing {
                writeln!(f, "  - {name}")?;
            }
        }

        write!(f, "server namespaces: {}", self.server_namespaces.join(", "))
    }
}
