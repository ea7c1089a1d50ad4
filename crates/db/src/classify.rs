//! Maps driver errors onto the provisioning error taxonomy.

use mongodb::error::{Error, ErrorKind};

use provision_kernel::ProvisionError;

const UNAUTHORIZED: i32 = 13;
const AUTHENTICATION_FAILED: i32 = 18;
const NAMESPACE_EXISTS: i32 = 48;
const USER_ALREADY_EXISTS: i32 = 51003;

/// Whether a creation call failed only because its target already exists.
pub(crate) fn is_already_exists(error: &Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => is_already_exists_code(command.code),
        _ => false,
    }
}

/// Translate a driver error raised while working on `namespace`.
pub(crate) fn classify(error: Error, namespace: &str) -> ProvisionError {
    match error.kind.as_ref() {
        ErrorKind::Command(command) => {
            classify_command(command.code, &command.code_name, &command.message, namespace)
        }
        ErrorKind::Authentication { .. } => ProvisionError::auth(error.to_string()),
        ErrorKind::ServerSelection { .. }
        | ErrorKind::Io(_)
        | ErrorKind::DnsResolve { .. }
        | ErrorKind::ConnectionPoolCleared { .. } => ProvisionError::connection(error.to_string()),
        ErrorKind::InvalidArgument { .. } => ProvisionError::config(error.to_string()),
        _ => ProvisionError::server(error.to_string()),
    }
}

fn is_already_exists_code(code: i32) -> bool {
    code == NAMESPACE_EXISTS || code == USER_ALREADY_EXISTS
}

fn classify_command(code: i32, code_name: &str, message: &str, namespace: &str) -> ProvisionError {
    match code {
        UNAUTHORIZED => ProvisionError::privilege(namespace, message),
        AUTHENTICATION_FAILED => ProvisionError::auth(message),
        _ => ProvisionError::server(format!("{code_name} ({code}): {message}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_scoped_to_namespace() {
        let error = classify_command(
            13,
            "Unauthorized",
            "not authorized on AfterDomainChange to execute command",
            "AfterDomainChange",
        );
        match error {
            ProvisionError::Privilege { namespace, .. } => {
                assert_eq!(namespace, "AfterDomainChange")
            }
            other => panic!("expected privilege error, got {other:?}"),
        }
    }

    #[test]
    fn authentication_failed_is_auth() {
        let error = classify_command(18, "AuthenticationFailed", "Authentication failed.", "admin");
        assert!(matches!(error, ProvisionError::Auth { .. }));
    }

    #[test]
    fn other_codes_are_server_errors() {
        let error = classify_command(2, "BadValue", "bad", "BeforeDomainChange");
        assert_eq!(error.to_string(), "server error: BadValue (2): bad");
    }

    #[test]
    fn existence_codes() {
        assert!(is_already_exists_code(48));
        assert!(is_already_exists_code(51003));
        assert!(!is_already_exists_code(13));
    }
}
