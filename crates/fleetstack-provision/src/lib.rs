//! FleetStack provisioner abstraction
//!
//! Every infrastructure backend (container engine, environment manager,
//! cloud compute) implements [`Provisioner`]. Backends are selected from
//! configuration at process start and handed around as
//! `Arc<dyn Provisioner>`.

pub mod command;
pub mod error;
pub mod fake;
pub mod provisioner;

pub use command::CommandRunner;
pub use error::{ProvisionError, Result};
pub use fake::{Cmd, FakeProvisioner};
pub use provisioner::{Method, Output, Provisioner};
