//! Docker provisioner for FleetStack
//!
//! Each unit is a container labelled with its app and unit name. Each app
//! gets its own bridge network; the network doubles as the app's
//! "provisioned" marker.

pub mod converter;
pub mod provisioner;

pub use converter::{DockerSettings, LABEL_APP, LABEL_UNIT};
pub use provisioner::DockerProvisioner;
