//! juju provisioner

use crate::status::JujuStatus;
use async_trait::async_trait;
use fleetstack_core::{App, Unit};
use fleetstack_provision::{CommandRunner, Output, ProvisionError, Provisioner, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

const RESTART_HOOK: &str = "/var/lib/fleetstack/hooks/restart";

/// juju バックエンドの設定
#[derive(Debug, Clone)]
pub struct JujuSettings {
    /// juju バイナリのパス
    pub binary: String,
    /// ローカル charm リポジトリ
    pub charms_path: String,
    pub series: String,
    /// deploy / status などの管理コマンドのタイムアウト
    pub command_timeout: Duration,
    /// `execute_command` のタイムアウト
    pub exec_timeout: Duration,
}

impl Default for JujuSettings {
    fn default() -> Self {
        Self {
            binary: "juju".to_string(),
            charms_path: "/etc/fleetstack/charms".to_string(),
            series: "precise".to_string(),
            command_timeout: Duration::from_secs(300),
            exec_timeout: Duration::from_secs(10),
        }
    }
}

/// juju provisioner
pub struct JujuProvisioner {
    juju: CommandRunner,
    exec: CommandRunner,
    settings: JujuSettings,
}

impl JujuProvisioner {
    pub fn new(settings: JujuSettings) -> Self {
        let runner = CommandRunner::new(&settings.binary);
        Self::with_runner(runner, settings)
    }

    /// Drive juju through an already configured runner (e.g. a wrapper
    /// script); timeouts still come from the settings.
    pub fn with_runner(runner: CommandRunner, settings: JujuSettings) -> Self {
        let juju = runner.with_timeout(settings.command_timeout);
        let exec = juju.clone().with_timeout(settings.exec_timeout);
        Self {
            juju,
            exec,
            settings,
        }
    }

    pub async fn status(&self) -> Result<JujuStatus> {
        let output = self.juju.run(&["status", "--format", "json"]).await?;
        Ok(JujuStatus::parse(&output)?)
    }

    /// Status, failing with `NotProvisioned` when the app has no service
    async fn provisioned_status(&self, app: &App) -> Result<JujuStatus> {
        let status = self.status().await?;
        if !status.has_service(&app.name) {
            return Err(ProvisionError::NotProvisioned(app.name.clone()));
        }
        Ok(status)
    }

    fn charm(&self, framework: &str) -> String {
        format!("local:{}/{}", self.settings.series, framework)
    }

    /// Machines are released best-effort; a leftover machine is logged,
    /// the unit is already gone from the service.
    async fn terminate_machine(&self, machine: u32) {
        if machine == 0 {
            return;
        }
        let id = machine.to_string();
        if let Err(e) = self.juju.run(&["terminate-machine", id.as_str()]).await {
            warn!(machine, error = %e, "failed to terminate machine");
        }
    }
}

#[async_trait]
impl Provisioner for JujuProvisioner {
    fn name(&self) -> &str {
        "juju"
    }

    async fn provision(&self, app: &App) -> Result<()> {
        if self.status().await?.has_service(&app.name) {
            return Err(ProvisionError::AlreadyProvisioned(app.name.clone()));
        }
        let charm = self.charm(&app.framework);
        let num_units = app.units.len().to_string();
        self.juju
            .run(&[
                "deploy",
                "--repository",
                self.settings.charms_path.as_str(),
                charm.as_str(),
                app.name.as_str(),
                "--num-units",
                num_units.as_str(),
            ])
            .await?;
        info!(app = %app.name, charm = %charm, "service deployed");
        Ok(())
    }

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>> {
        if n == 0 {
            return Err(ProvisionError::ZeroUnits);
        }
        let before: HashSet<String> = self
            .provisioned_status(app)
            .await?
            .units_of(&app.name)
            .into_iter()
            .map(|u| u.name)
            .collect();

        let count = n.to_string();
        self.juju
            .run(&["add-unit", app.name.as_str(), "--num-units", count.as_str()])
            .await?;

        Ok(self
            .status()
            .await?
            .units_of(&app.name)
            .into_iter()
            .filter(|u| !before.contains(&u.name))
            .collect())
    }

    async fn remove_unit(&self, app: &App, unit_name: &str) -> Result<()> {
        let unit = self
            .provisioned_status(app)
            .await?
            .units_of(&app.name)
            .into_iter()
            .find(|u| u.name == unit_name)
            .ok_or_else(|| ProvisionError::UnitNotFound(unit_name.to_string()))?;

        self.juju.run(&["remove-unit", unit_name]).await?;
        self.terminate_machine(unit.machine).await;
        Ok(())
    }

    async fn restart(&self, app: &App) -> Result<()> {
        let units = self.provisioned_status(app).await?.units_of(&app.name);
        for unit in units {
            self.exec
                .run(&[
                    "ssh",
                    "-o",
                    "StrictHostKeyChecking no",
                    "-q",
                    unit.name.as_str(),
                    RESTART_HOOK,
                ])
                .await?;
        }
        Ok(())
    }

    async fn destroy(&self, app: &App) -> Result<()> {
        let units = self.provisioned_status(app).await?.units_of(&app.name);
        self.juju.run(&["destroy-service", app.name.as_str()]).await?;
        for unit in units {
            self.terminate_machine(unit.machine).await;
        }
        info!(app = %app.name, "service destroyed");
        Ok(())
    }

    async fn execute_command(
        &self,
        stdout: Output<'_>,
        stderr: Output<'_>,
        app: &App,
        cmd: &str,
        args: &[String],
    ) -> Result<()> {
        let units = self.provisioned_status(app).await?.units_of(&app.name);
        for unit in units {
            let machine = unit.machine.to_string();
            let mut argv = vec!["ssh", "-o", "StrictHostKeyChecking no", "-q", machine.as_str(), cmd];
            argv.extend(args.iter().map(String::as_str));
            self.exec
                .run_streamed(&argv, &mut *stdout, &mut *stderr)
                .await?;
        }
        Ok(())
    }

    async fn collect_status(&self) -> Result<Vec<Unit>> {
        Ok(self.status().await?.all_units())
    }

    async fn addr(&self, app: &App) -> Result<String> {
        self.provisioned_status(app)
            .await?
            .units_of(&app.name)
            .into_iter()
            .find(|u| u.has_address())
            .map(|u| u.ip)
            .ok_or_else(|| ProvisionError::Backend(format!("{} has no unit with an address", app.name)))
    }
}
