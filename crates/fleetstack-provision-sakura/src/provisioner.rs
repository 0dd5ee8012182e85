//! Sakura Cloud provisioner

use crate::usacloud::{
    CreateServerConfig, ServerInfo, SwitchInfo, TAG_APP, TAG_FRAMEWORK, TAG_UNIT, Usacloud,
};
use async_trait::async_trait;
use fleetstack_core::{App, Unit, UnitStatus};
use fleetstack_provision::{CommandRunner, Output, ProvisionError, Provisioner, Result};
use std::time::Duration;
use tracing::{info, warn};

/// Sakura Cloud バックエンドの設定
#[derive(Debug, Clone)]
pub struct SakuraSettings {
    /// ゾーン (is1a, is1b, tk1a など)
    pub zone: String,
    /// ssh ログインユーザー
    pub ssh_user: String,
    /// アプリのアドレスに使うドメイン (`<app>.<domain>`)
    pub domain: String,
    pub core: i32,
    /// メモリ (GB)
    pub memory: i32,
    pub os_type: Option<String>,
    pub ssh_key_ids: Vec<String>,
    pub command_timeout: Duration,
    pub exec_timeout: Duration,
}

impl Default for SakuraSettings {
    fn default() -> Self {
        Self {
            zone: "is1a".to_string(),
            ssh_user: "ubuntu".to_string(),
            domain: "fleetstack.cloud".to_string(),
            core: 1,
            memory: 1,
            os_type: Some("ubuntu".to_string()),
            ssh_key_ids: Vec::new(),
            command_timeout: Duration::from_secs(300),
            exec_timeout: Duration::from_secs(10),
        }
    }
}

/// Sakura Cloud provisioner
///
/// Every app owns a switch tagged `fleetstack.app=<app>`; its presence
/// marks the app as provisioned, even with zero units. Units are servers
/// named `<app>-<index>` carrying the app, unit and framework tags.
pub struct SakuraProvisioner {
    usacloud: Usacloud,
    ssh: CommandRunner,
    settings: SakuraSettings,
}

impl SakuraProvisioner {
    pub fn new(settings: SakuraSettings) -> Self {
        let usacloud =
            CommandRunner::new("usacloud").with_base_args(["--zone", settings.zone.as_str()]);
        Self::with_runners(usacloud, CommandRunner::new("ssh"), settings)
    }

    /// Build from preconfigured usacloud and ssh runners; timeouts still come
    /// from the settings.
    pub fn with_runners(usacloud: CommandRunner, ssh: CommandRunner, settings: SakuraSettings) -> Self {
        Self {
            usacloud: Usacloud::with_runner(usacloud.with_timeout(settings.command_timeout)),
            ssh: ssh.with_timeout(settings.exec_timeout),
            settings,
        }
    }

    fn app_tag(app: &str) -> String {
        format!("{TAG_APP}{app}")
    }

    async fn switch_of(&self, app: &App) -> Result<Option<SwitchInfo>> {
        let tag = Self::app_tag(&app.name);
        Ok(self
            .usacloud
            .list_switches()
            .await?
            .into_iter()
            .find(|s| s.tags.contains(&tag)))
    }

    async fn require_switch(&self, app: &App) -> Result<SwitchInfo> {
        self.switch_of(app)
            .await?
            .ok_or_else(|| ProvisionError::NotProvisioned(app.name.clone()))
    }

    /// Servers of one app, ordered by unit index
    async fn servers_of(&self, app: &App) -> Result<Vec<ServerInfo>> {
        let mut servers: Vec<ServerInfo> = self
            .usacloud
            .list_servers()
            .await?
            .into_iter()
            .filter(|s| s.app() == Some(app.name.as_str()))
            .collect();
        servers.sort_by_key(|s| to_unit(s).index().unwrap_or(0));
        Ok(servers)
    }

    /// Create `n` servers starting at unit index `first`. When one fails the
    /// servers created by this call are deleted again.
    async fn create_units(&self, app: &App, first: usize, n: usize) -> Result<Vec<Unit>> {
        let mut units = Vec::with_capacity(n);
        for index in first..first + n {
            match self.create_unit(app, index).await {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    self.delete_servers(app, &units).await;
                    return Err(e);
                }
            }
        }
        Ok(units)
    }

    /// Best-effort removal of servers left by a failed operation
    async fn delete_servers(&self, app: &App, units: &[Unit]) {
        for unit in units {
            if let Err(e) = self.usacloud.delete_server(&unit.instance_id).await {
                warn!(
                    app = %app.name,
                    server = %unit.instance_id,
                    error = %e,
                    "failed to delete server"
                );
            }
        }
    }

    async fn create_unit(&self, app: &App, index: usize) -> Result<Unit> {
        let unit_name = Unit::unit_name(&app.name, index);
        let config = CreateServerConfig {
            name: format!("{}-{}", app.name, index),
            core: self.settings.core,
            memory: self.settings.memory,
            os_type: self.settings.os_type.clone(),
            ssh_key_ids: self.settings.ssh_key_ids.clone(),
            tags: vec![
                Self::app_tag(&app.name),
                format!("{TAG_UNIT}{unit_name}"),
                format!("{TAG_FRAMEWORK}{}", app.framework),
            ],
        };
        let server = self.usacloud.create_server(&config).await?;
        info!(app = %app.name, unit = %unit_name, server = %server.id, "server created");

        let mut unit = to_unit(&server);
        unit.name = unit_name;
        unit.app_name = app.name.clone();
        unit.unit_type = app.framework.clone();
        unit.machine = index as u32;
        if unit.state == UnitStatus::Pending {
            unit.state = UnitStatus::Creating;
        }
        Ok(unit)
    }
}

/// Convert a tagged server into a unit
fn to_unit(server: &ServerInfo) -> Unit {
    let name = server.unit().unwrap_or(&server.name).to_string();
    let mut unit = Unit {
        name,
        app_name: server.app().unwrap_or_default().to_string(),
        unit_type: server.tag(TAG_FRAMEWORK).unwrap_or_default().to_string(),
        machine: 0,
        instance_id: server.id.clone(),
        ip: server.ip_address().unwrap_or_default(),
        state: server.unit_status(),
    };
    unit.machine = unit.index().unwrap_or(0) as u32;
    unit
}

#[async_trait]
impl Provisioner for SakuraProvisioner {
    fn name(&self) -> &str {
        "sakura"
    }

    async fn provision(&self, app: &App) -> Result<()> {
        if self.switch_of(app).await?.is_some() {
            return Err(ProvisionError::AlreadyProvisioned(app.name.clone()));
        }
        let switch = self
            .usacloud
            .create_switch(&format!("fleetstack-{}", app.name), &Self::app_tag(&app.name))
            .await?;
        info!(app = %app.name, switch = %switch.id, "switch created");

        if !app.units.is_empty() {
            if let Err(e) = self.create_units(app, 0, app.units.len()).await {
                if let Err(cleanup) = self.usacloud.delete_switch(&switch.id).await {
                    warn!(
                        app = %app.name,
                        switch = %switch.id,
                        error = %cleanup,
                        "failed to delete switch"
                    );
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>> {
        if n == 0 {
            return Err(ProvisionError::ZeroUnits);
        }
        self.require_switch(app).await?;
        let next = self
            .servers_of(app)
            .await?
            .iter()
            .filter_map(|s| to_unit(s).index())
            .max()
            .map_or(0, |i| i + 1);
        self.create_units(app, next, n).await
    }

    async fn remove_unit(&self, app: &App, unit_name: &str) -> Result<()> {
        self.require_switch(app).await?;
        let server = self
            .servers_of(app)
            .await?
            .into_iter()
            .find(|s| s.unit() == Some(unit_name))
            .ok_or_else(|| ProvisionError::UnitNotFound(unit_name.to_string()))?;

        self.usacloud.delete_server(&server.id).await?;
        info!(app = %app.name, unit = %unit_name, "server deleted");
        Ok(())
    }

    async fn restart(&self, app: &App) -> Result<()> {
        self.require_switch(app).await?;
        for server in self.servers_of(app).await? {
            self.usacloud.reset_server(&server.id).await?;
        }
        Ok(())
    }

    async fn destroy(&self, app: &App) -> Result<()> {
        let switch = self.require_switch(app).await?;
        for server in self.servers_of(app).await? {
            self.usacloud.delete_server(&server.id).await?;
        }
        self.usacloud.delete_switch(&switch.id).await?;
        info!(app = %app.name, "app destroyed");
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
        self.require_switch(app).await?;
        for server in self.servers_of(app).await? {
            let Some(ip) = server.ip_address() else {
                continue;
            };
            let host = format!("{}@{}", self.settings.ssh_user, ip);
            let mut argv = vec!["-o", "StrictHostKeyChecking=no", "-q", host.as_str(), cmd];
            argv.extend(args.iter().map(String::as_str));
            self.ssh
                .run_streamed(&argv, &mut *stdout, &mut *stderr)
                .await?;
        }
        Ok(())
    }

    async fn collect_status(&self) -> Result<Vec<Unit>> {
        let mut units: Vec<Unit> = self
            .usacloud
            .list_servers()
            .await?
            .iter()
            .filter(|s| s.app().is_some())
            .map(to_unit)
            .collect();
        units.sort_by(|a, b| {
            a.app_name
                .cmp(&b.app_name)
                .then(a.index().unwrap_or(0).cmp(&b.index().unwrap_or(0)))
        });
        Ok(units)
    }

    async fn addr(&self, app: &App) -> Result<String> {
        self.require_switch(app).await?;
        Ok(format!("{}.{}", app.name, self.settings.domain))
    }
}
