//! Error taxonomy for provisioning runs

use thiserror::Error;

use crate::manifest::ManifestError;

/// Failures a provisioning run can hit.
///
/// An existing target is not an error; creation calls report it as
/// [`crate::Outcome::AlreadyPresent`].
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error("connection error: {message}")]
    Connection { message: String },

    #[error("authentication error: {message}")]
    Auth { message: String },

    #[error("insufficient privileges on namespace '{namespace}': {message}")]
    Privilege { namespace: String, message: String },

    #[error("principal '{name}' already exists without role(s) {missing}")]
    PrincipalConflict { name: String, missing: String },

    #[error("invalid manifest: {0}")]
    InvalidManifest(#[from] ManifestError),

    #[error("configuration error: {message}")]
    Config { message: String },

    #[error("server error: {message}")]
    Server { message: String },
}

impl ProvisionError {
    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Create an authentication error
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// Create a privilege error scoped to one namespace
    pub fn privilege(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Privilege {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a generic server-side error
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Whether the error aborts the whole run rather than a single namespace.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Privilege { .. })
    }

    /// Short machine-readable code, used in JSON reports.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::Auth { .. } => "auth_error",
            Self::Privilege { .. } => "privilege_error",
            Self::PrincipalConflict { .. } => "principal_conflict",
            Self::InvalidManifest(_) => "invalid_manifest",
            Self::Config { .. } => "config_error",
            Self::Server { .. } => "server_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_privilege_errors_are_scoped() {
        assert!(!ProvisionError::privilege("AfterDomainChange", "not authorized").is_fatal());
        assert!(ProvisionError::connection("refused").is_fatal());
        assert!(ProvisionError::auth("bad credentials").is_fatal());
        assert!(ProvisionError::server("boom").is_fatal());
    }

    #[test]
    fn test_privilege_message_names_namespace() {
        let error = ProvisionError::privilege("BeforeDomainChange", "not authorized");
        assert_eq!(
            error.to_string(),
            "insufficient privileges on namespace 'BeforeDomainChange': not authorized"
        );
        assert_eq!(error.code(), "privilege_error");
    }
}
