//! In-process provisioner
//!
//! Keeps units in memory and lets callers arm failures and queue command
//! output. Used by tests across the workspace and selectable as
//! `provisioner: fake` for local runs.

use crate::error::{ProvisionError, Result};
use crate::provisioner::{Method, Output, Provisioner};
use async_trait::async_trait;
use fleetstack_core::{App, Unit, UnitStatus};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};

/// A command recorded by `execute_command`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    pub cmd: String,
    pub args: Vec<String>,
    pub app: String,
}

#[derive(Default)]
struct FakeState {
    /// Provisioned app names, in provisioning order
    apps: Vec<String>,
    units: HashMap<String, Vec<Unit>>,
    restarts: HashMap<String, usize>,
    cmds: Vec<Cmd>,
    failures: HashMap<Method, VecDeque<ProvisionError>>,
    outputs: VecDeque<Vec<u8>>,
    machines: u32,
}

impl FakeState {
    fn take_failure(&mut self, method: Method) -> Option<ProvisionError> {
        self.failures.get_mut(&method)?.pop_front()
    }

    fn is_provisioned(&self, app: &str) -> bool {
        self.apps.iter().any(|a| a == app)
    }

    fn new_unit(&mut self, app: &App, index: usize) -> Unit {
        self.machines += 1;
        Unit {
            name: Unit::unit_name(&app.name, index),
            app_name: app.name.clone(),
            unit_type: app.framework.clone(),
            machine: self.machines,
            instance_id: format!("i-08{:02}", self.machines),
            ip: format!("10.10.10.{}", self.machines),
            state: UnitStatus::Started,
        }
    }
}

/// Fake provisioner
pub struct FakeProvisioner {
    state: Mutex<FakeState>,
    output_ready: Notify,
    exec_timeout: Duration,
}

impl Default for FakeProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            output_ready: Notify::new(),
            exec_timeout: Duration::from_secs(2),
        }
    }

    /// How long `execute_command` waits for queued output
    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }

    /// Arm one failure for one operation. Failures for the same method are
    /// consumed in the order they were prepared.
    pub async fn prepare_failure(&self, method: Method, err: ProvisionError) {
        let mut state = self.state.lock().await;
        state.failures.entry(method).or_default().push_back(err);
    }

    /// Queue output for the next `execute_command`
    pub async fn prepare_output(&self, output: impl Into<Vec<u8>>) {
        self.state.lock().await.outputs.push_back(output.into());
        self.output_ready.notify_one();
    }

    /// Position of the app in the provisioned list
    pub async fn find_app(&self, app: &str) -> Option<usize> {
        self.state.lock().await.apps.iter().position(|a| a == app)
    }

    pub async fn provisioned_apps(&self) -> Vec<String> {
        self.state.lock().await.apps.clone()
    }

    pub async fn restarts(&self, app: &str) -> usize {
        self.state
            .lock()
            .await
            .restarts
            .get(app)
            .copied()
            .unwrap_or(0)
    }

    /// Commands recorded for `app`; an empty `cmd` matches every command
    pub async fn get_cmds(&self, cmd: &str, app: &str) -> Vec<Cmd> {
        self.state
            .lock()
            .await
            .cmds
            .iter()
            .filter(|c| c.app == app && (cmd.is_empty() || c.cmd == cmd))
            .cloned()
            .collect()
    }

    pub async fn get_units(&self, app: &str) -> Vec<Unit> {
        self.state
            .lock()
            .await
            .units
            .get(app)
            .cloned()
            .unwrap_or_default()
    }

    /// Overwrite the state of one unit
    pub async fn set_unit_status(&self, app: &str, unit: &str, status: UnitStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let found = state
            .units
            .get_mut(app)
            .and_then(|units| units.iter_mut().find(|u| u.name == unit))
            .ok_or_else(|| ProvisionError::UnitNotFound(unit.to_string()))?;
        found.state = status;
        Ok(())
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    fn name(&self) -> &str {
        "fake"
    }

    async fn provision(&self, app: &App) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::Provision) {
            return Err(err);
        }
        if state.is_provisioned(&app.name) {
            return Err(ProvisionError::AlreadyProvisioned(app.name.clone()));
        }
        let units: Vec<Unit> = (0..app.units.len())
            .map(|index| state.new_unit(app, index))
            .collect();
        state.apps.push(app.name.clone());
        state.units.insert(app.name.clone(), units);
        Ok(())
    }

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::AddUnits) {
            return Err(err);
        }
        if n == 0 {
            return Err(ProvisionError::ZeroUnits);
        }
        if !state.is_provisioned(&app.name) {
            return Err(ProvisionError::NotProvisioned(app.name.clone()));
        }
        let start = state
            .units
            .get(&app.name)
            .map(|units| units.iter().filter_map(Unit::index).max().map_or(0, |i| i + 1))
            .unwrap_or(0);
        let added: Vec<Unit> = (start..start + n)
            .map(|index| state.new_unit(app, index))
            .collect();
        state
            .units
            .entry(app.name.clone())
            .or_default()
            .extend(added.iter().cloned());
        Ok(added)
    }

    async fn remove_unit(&self, app: &App, unit_name: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::RemoveUnit) {
            return Err(err);
        }
        if !state.is_provisioned(&app.name) {
            return Err(ProvisionError::NotProvisioned(app.name.clone()));
        }
        let units = state.units.entry(app.name.clone()).or_default();
        let position = units
            .iter()
            .position(|u| u.name == unit_name)
            .ok_or_else(|| ProvisionError::UnitNotFound(unit_name.to_string()))?;
        units.remove(position);
        Ok(())
    }

    async fn restart(&self, app: &App) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::Restart) {
            return Err(err);
        }
        *state.restarts.entry(app.name.clone()).or_insert(0) += 1;
        Ok(())
    }

    async fn destroy(&self, app: &App) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::Destroy) {
            return Err(err);
        }
        let position = state
            .apps
            .iter()
            .position(|a| *a == app.name)
            .ok_or_else(|| ProvisionError::NotProvisioned(app.name.clone()))?;
        state.apps.remove(position);
        state.units.remove(&app.name);
        state.restarts.remove(&app.name);
        Ok(())
    }

    async fn execute_command(
        &self,
        stdout: Output<'_>,
        _stderr: Output<'_>,
        app: &App,
        cmd: &str,
        args: &[String],
    ) -> Result<()> {
        self.state.lock().await.cmds.push(Cmd {
            cmd: cmd.to_string(),
            args: args.to_vec(),
            app: app.name.clone(),
        });

        let deadline = tokio::time::Instant::now() + self.exec_timeout;
        loop {
            let (output, failure) = {
                let mut state = self.state.lock().await;
                let failure = state.take_failure(Method::ExecuteCommand);
                (state.outputs.pop_front(), failure)
            };
            match (output, failure) {
                (Some(output), failure) => {
                    stdout.write_all(&output).await?;
                    stdout.flush().await?;
                    return failure.map_or(Ok(()), Err);
                }
                (None, Some(err)) => return Err(err),
                (None, None) => {}
            }
            if tokio::time::timeout_at(deadline, self.output_ready.notified())
                .await
                .is_err()
            {
                return Err(ProvisionError::Timeout(
                    "FakeProvisioner timed out waiting for output.".to_string(),
                ));
            }
        }
    }

    async fn collect_status(&self) -> Result<Vec<Unit>> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::CollectStatus) {
            return Err(err);
        }
        Ok(state
            .apps
            .iter()
            .filter_map(|app| state.units.get(app))
            .flatten()
            .cloned()
            .collect())
    }

    async fn addr(&self, app: &App) -> Result<String> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.take_failure(Method::Addr) {
            return Err(err);
        }
        Ok(format!("{}.fake-lb.fleetstack.io", app.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstack_core::ErrorKind;

    fn app_with_units(name: &str, units: usize) -> App {
        let units = (0..units)
            .map(|i| Unit {
                name: Unit::unit_name(name, i),
                app_name: name.to_string(),
                ..Default::default()
            })
            .collect();
        App::new(name, "rush").with_units(units)
    }

    fn fast() -> FakeProvisioner {
        FakeProvisioner::new().with_exec_timeout(Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_provision_allocates_declared_units() {
        let p = FakeProvisioner::new();
        let app = app_with_units("kid-gloves", 1);

        p.provision(&app).await.unwrap();

        let units = p.get_units("kid-gloves").await;
        assert_eq!(p.provisioned_apps().await, vec!["kid-gloves"]);
        assert_eq!(
            units,
            vec![Unit {
                name: "kid-gloves/0".to_string(),
                app_name: "kid-gloves".to_string(),
                unit_type: "rush".to_string(),
                machine: 1,
                instance_id: "i-0801".to_string(),
                ip: "10.10.10.1".to_string(),
                state: UnitStatus::Started,
            }]
        );
    }

    #[tokio::test]
    async fn test_provision_with_zero_units() {
        let p = FakeProvisioner::new();
        p.provision(&app_with_units("mystic-rhythms", 0)).await.unwrap();
        assert!(p.get_units("mystic-rhythms").await.is_empty());
        assert_eq!(p.find_app("mystic-rhythms").await, Some(0));
    }

    #[tokio::test]
    async fn test_double_provision() {
        let p = FakeProvisioner::new();
        let app = app_with_units("kid-gloves", 1);
        p.provision(&app).await.unwrap();

        let err = p.provision(&app).await.unwrap_err();

        assert!(matches!(err, ProvisionError::AlreadyProvisioned(_)));
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(p.get_units("kid-gloves").await.len(), 1);
    }

    #[tokio::test]
    async fn test_prepared_failure_hits_only_its_method() {
        let p = FakeProvisioner::new();
        let app = app_with_units("kid-gloves", 1);
        p.prepare_failure(Method::Restart, ProvisionError::Backend("Failed to restart.".into()))
            .await;

        p.provision(&app).await.unwrap();
        let err = p.restart(&app).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to restart.");

        // consumed: the next restart goes through
        p.restart(&app).await.unwrap();
        assert_eq!(p.restarts("kid-gloves").await, 1);
    }

    #[tokio::test]
    async fn test_add_units() {
        let p = FakeProvisioner::new();
        let app = app_with_units("mystic-rhythms", 1);
        p.provision(&app).await.unwrap();

        let units = p.add_units(&app, 2).await.unwrap();

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "mystic-rhythms/1");
        assert_eq!(units[1].name, "mystic-rhythms/2");
        assert_eq!(p.get_units("mystic-rhythms").await.len(), 3);
    }

    #[tokio::test]
    async fn test_add_zero_units_always_fails() {
        let p = FakeProvisioner::new();
        let unprovisioned = app_with_units("nobody", 0);
        let err = p.add_units(&unprovisioned, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot add 0 units.");
        assert_eq!(err.kind(), ErrorKind::Validation);

        let app = app_with_units("somebody", 0);
        p.provision(&app).await.unwrap();
        assert!(matches!(
            p.add_units(&app, 0).await,
            Err(ProvisionError::ZeroUnits)
        ));
    }

    #[tokio::test]
    async fn test_add_units_unprovisioned_app() {
        let p = FakeProvisioner::new();
        let err = p
            .add_units(&app_with_units("mystic-rhythms", 0), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::NotProvisioned(_)));
    }

    #[tokio::test]
    async fn test_remove_unit_keeps_names() {
        let p = FakeProvisioner::new();
        let app = app_with_units("hemispheres", 0);
        p.provision(&app).await.unwrap();
        p.add_units(&app, 3).await.unwrap();

        p.remove_unit(&app, "hemispheres/1").await.unwrap();

        let names: Vec<_> = p
            .get_units("hemispheres")
            .await
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, vec!["hemispheres/0", "hemispheres/2"]);

        // indices are never reused
        let added = p.add_units(&app, 1).await.unwrap();
        assert_eq!(added[0].name, "hemispheres/3");
    }

    #[tokio::test]
    async fn test_remove_unknown_unit() {
        let p = FakeProvisioner::new();
        let app = app_with_units("hemispheres", 0);
        let err = p.remove_unit(&app, "hemispheres/1").await.unwrap_err();
        assert!(matches!(err, ProvisionError::NotProvisioned(_)));

        p.provision(&app).await.unwrap();
        p.add_units(&app, 2).await.unwrap();
        let err = p.remove_unit(&app, "hemispheres/3").await.unwrap_err();
        assert!(matches!(err, ProvisionError::UnitNotFound(_)));
    }

    #[tokio::test]
    async fn test_destroy() {
        let p = FakeProvisioner::new();
        let app = app_with_units("kid-gloves", 1);
        p.provision(&app).await.unwrap();
        p.restart(&app).await.unwrap();

        p.destroy(&app).await.unwrap();

        assert_eq!(p.find_app("kid-gloves").await, None);
        assert_eq!(p.restarts("kid-gloves").await, 0);
        assert!(p.get_units("kid-gloves").await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_not_provisioned_is_distinct() {
        let p = FakeProvisioner::new();
        let err = p.destroy(&app_with_units("red-lenses", 1)).await.unwrap_err();
        assert!(matches!(err, ProvisionError::NotProvisioned(_)));
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_execute_command_streams_output() {
        let p = fast();
        let app = app_with_units("grand-designs", 0);
        p.prepare_output("myoutput!").await;
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        p.execute_command(&mut stdout, &mut stderr, &app, "ls", &["-l".to_string()])
            .await
            .unwrap();

        assert_eq!(stdout, b"myoutput!");
        let cmds = p.get_cmds("ls", "grand-designs").await;
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].args, vec!["-l"]);
    }

    #[tokio::test]
    async fn test_execute_command_writes_partial_output_before_failure() {
        let p = fast();
        let app = app_with_units("marathon", 1);
        p.prepare_failure(
            Method::ExecuteCommand,
            ProvisionError::Command("Failed to run command.".into()),
        )
        .await;
        p.prepare_output("myoutput!").await;
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        let err = p
            .execute_command(&mut stdout, &mut stderr, &app, "ls", &[])
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Command execution failed: Failed to run command.");
        assert_eq!(stdout, b"myoutput!");
    }

    #[tokio::test]
    async fn test_execute_command_failure_without_output() {
        let p = fast();
        let app = app_with_units("manhattan-project", 1);
        p.prepare_failure(
            Method::ExecuteCommand,
            ProvisionError::Command("Failed to run command.".into()),
        )
        .await;
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        let err = p
            .execute_command(&mut stdout, &mut stderr, &app, "ls", &[])
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Command(_)));
        assert!(stdout.is_empty());
    }

    #[tokio::test]
    async fn test_execute_command_timeout() {
        let p = fast();
        let app = app_with_units("territories", 1);
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        let err = p
            .execute_command(&mut stdout, &mut stderr, &app, "ls -l", &[])
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(
            err.to_string(),
            "Timed out: FakeProvisioner timed out waiting for output."
        );
    }

    #[tokio::test]
    async fn test_execute_command_waits_for_late_output() {
        let p = std::sync::Arc::new(FakeProvisioner::new());
        let app = app_with_units("late", 1);
        let producer = p.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.prepare_output("eventually").await;
        });
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        p.execute_command(&mut stdout, &mut stderr, &app, "true", &[])
            .await
            .unwrap();

        assert_eq!(stdout, b"eventually");
    }

    #[tokio::test]
    async fn test_collect_status() {
        let p = FakeProvisioner::new();
        for name in ["red-lenses", "between-the-wheels", "the-big-money"] {
            p.provision(&app_with_units(name, 1)).await.unwrap();
        }

        let units = p.collect_status().await.unwrap();

        let summary: Vec<_> = units
            .iter()
            .map(|u| (u.name.as_str(), u.instance_id.as_str(), u.ip.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("red-lenses/0", "i-0801", "10.10.10.1"),
                ("between-the-wheels/0", "i-0802", "10.10.10.2"),
                ("the-big-money/0", "i-0803", "10.10.10.3"),
            ]
        );
    }

    #[tokio::test]
    async fn test_collect_status_failure_and_empty() {
        let p = FakeProvisioner::new();
        assert!(p.collect_status().await.unwrap().is_empty());

        p.prepare_failure(
            Method::CollectStatus,
            ProvisionError::Backend("Failed to collect status.".into()),
        )
        .await;
        let err = p.collect_status().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to collect status.");
    }

    #[tokio::test]
    async fn test_addr() {
        let p = FakeProvisioner::new();
        let addr = p.addr(&app_with_units("quick", 1)).await.unwrap();
        assert_eq!(addr, "quick.fake-lb.fleetstack.io");
    }

    #[tokio::test]
    async fn test_set_unit_status() {
        let p = FakeProvisioner::new();
        let app = app_with_units("quick", 1);
        p.provision(&app).await.unwrap();

        p.set_unit_status("quick", "quick/0", UnitStatus::Down)
            .await
            .unwrap();

        assert_eq!(p.get_units("quick").await[0].state, UnitStatus::Down);
        assert!(
            p.set_unit_status("quick", "quick/9", UnitStatus::Down)
                .await
                .is_err()
        );
    }
}
