//! juju provisioner for FleetStack
//!
//! Apps are juju services deployed from a local charm repository, one
//! charm per framework. State is read back from `juju status --format json`.

pub mod provisioner;
pub mod status;

pub use provisioner::{JujuProvisioner, JujuSettings};
pub use status::JujuStatus;
