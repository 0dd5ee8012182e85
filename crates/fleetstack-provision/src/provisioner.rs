//! Provisioner trait definition

use crate::error::Result;
use async_trait::async_trait;
use fleetstack_core::{App, Unit};
use tokio::io::AsyncWrite;

/// Output sink for `execute_command`
pub type Output<'a> = &'a mut (dyn AsyncWrite + Unpin + Send);

/// Provisioner abstraction trait
///
/// All backends (Docker, juju, Sakura Cloud, the fake) implement this trait
/// to provide a unified unit lifecycle. Errors that describe the app's
/// provisioning state (`AlreadyProvisioned`, `NotProvisioned`, `ZeroUnits`,
/// `UnitNotFound`, `Timeout`) are distinct from backend failures.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Returns the backend name (e.g., "docker", "juju")
    fn name(&self) -> &str;

    /// Allocate the units the app declares (possibly none).
    async fn provision(&self, app: &App) -> Result<()>;

    /// Append `n` units and return them.
    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>>;

    /// Remove exactly one unit. Remaining units keep their names.
    async fn remove_unit(&self, app: &App, unit_name: &str) -> Result<()>;

    async fn restart(&self, app: &App) -> Result<()>;

    /// Release every unit of the app.
    async fn destroy(&self, app: &App) -> Result<()>;

    /// Run a command on the app's units.
    ///
    /// Output captured before a failure is written to the sinks before the
    /// error is returned.
    async fn execute_command(
        &self,
        stdout: Output<'_>,
        stderr: Output<'_>,
        app: &App,
        cmd: &str,
        args: &[String],
    ) -> Result<()>;

    /// Snapshot of every unit of every provisioned app.
    async fn collect_status(&self) -> Result<Vec<Unit>>;

    /// Externally reachable address of the app.
    async fn addr(&self, app: &App) -> Result<String>;
}

/// Provisioner operations, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Provision,
    AddUnits,
    RemoveUnit,
    Restart,
    Destroy,
    ExecuteCommand,
    CollectStatus,
    Addr,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Provision => write!(f, "provision"),
            Method::AddUnits => write!(f, "add-units"),
            Method::RemoveUnit => write!(f, "remove-unit"),
            Method::Restart => write!(f, "restart"),
            Method::Destroy => write!(f, "destroy"),
            Method::ExecuteCommand => write!(f, "execute-command"),
            Method::CollectStatus => write!(f, "collect-status"),
            Method::Addr => write!(f, "addr"),
        }
    }
}
