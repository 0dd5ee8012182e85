//! Sakura Cloud provisioner for FleetStack
//!
//! Units are Sakura Cloud servers managed through the usacloud CLI and
//! tagged with their app and unit names. Each app owns a switch that marks
//! it as provisioned. Commands run over ssh.

pub mod provisioner;
pub mod usacloud;

pub use provisioner::{SakuraProvisioner, SakuraSettings};
pub use usacloud::{ServerInfo, SwitchInfo, Usacloud};
