//! Database provisioning: creates the administrative principal and the empty
//! measurement collections a [`provision_kernel::Manifest`] declares.

pub mod bootstrap;
pub mod report;

/// Re-export commonly used types
pub use bootstrap::{Bootstrapper, Phase};
pub use report::{ProvisionReport, StatusReport};
