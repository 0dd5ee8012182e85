//! Docker provisioner

use crate::converter::{self, DockerSettings, LABEL_APP, LABEL_UNIT};
use async_trait::async_trait;
use bollard::Docker;
use bollard::errors::Error as DockerError;
use fleetstack_core::{App, Unit};
use fleetstack_provision::{Output, ProvisionError, Provisioner, Result};
use futures_util::stream::StreamExt;
use std::collections::HashMap;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

fn backend(e: DockerError) -> ProvisionError {
    ProvisionError::Backend(e.to_string())
}

/// Docker provisioner
pub struct DockerProvisioner {
    docker: Docker,
    settings: DockerSettings,
}

/// A unit container as seen through the label filter
struct UnitContainer {
    id: String,
    unit: String,
}

impl DockerProvisioner {
    pub fn new(docker: Docker, settings: DockerSettings) -> Self {
        Self { docker, settings }
    }

    /// Connect to the local Docker daemon and check it answers
    pub async fn connect(settings: DockerSettings) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(backend)?;
        docker.ping().await.map_err(backend)?;
        Ok(Self::new(docker, settings))
    }

    async fn is_provisioned(&self, app: &str) -> Result<bool> {
        match self
            .docker
            .inspect_network(
                &self.settings.network_name(app),
                None::<bollard::query_parameters::InspectNetworkOptions>,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(backend(e)),
        }
    }

    async fn ensure_provisioned(&self, app: &App) -> Result<()> {
        if self.is_provisioned(&app.name).await? {
            Ok(())
        } else {
            Err(ProvisionError::NotProvisioned(app.name.clone()))
        }
    }

    /// Containers carrying the given label filter (`key` or `key=value`)
    async fn list_units(&self, label: String) -> Result<Vec<UnitContainer>> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label]);

        #[allow(deprecated)]
        let options = bollard::container::ListContainersOptions {
            all: true,
            filters,
            ..Default::default()
        };

        #[allow(deprecated)]
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(backend)?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let unit = c.labels.as_ref()?.get(LABEL_UNIT)?.clone();
                Some(UnitContainer { id: c.id?, unit })
            })
            .collect())
    }

    async fn app_units(&self, app: &str) -> Result<Vec<UnitContainer>> {
        let mut units = self.list_units(format!("{}={}", LABEL_APP, app)).await?;
        units.sort_by_key(|u| unit_index(&u.unit));
        Ok(units)
    }

    /// Build a `Unit` snapshot from `docker inspect`
    async fn inspect_unit(&self, container: &UnitContainer) -> Result<Unit> {
        let info = self
            .docker
            .inspect_container(
                &container.id,
                None::<bollard::query_parameters::InspectContainerOptions>,
            )
            .await
            .map_err(backend)?;

        let labels = info.config.as_ref().and_then(|c| c.labels.as_ref());
        let label = |key: &str| {
            labels
                .and_then(|l| l.get(key))
                .cloned()
                .unwrap_or_default()
        };

        let ip = info
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .and_then(|networks| {
                networks
                    .values()
                    .find_map(|e| e.ip_address.clone().filter(|ip| !ip.is_empty()))
            })
            .unwrap_or_default();

        Ok(Unit {
            name: container.unit.clone(),
            app_name: label(LABEL_APP),
            unit_type: label(converter::LABEL_FRAMEWORK),
            machine: unit_index(&container.unit) as u32,
            instance_id: container.id.chars().take(12).collect(),
            ip,
            state: converter::unit_status(info.state.as_ref()),
        })
    }

    async fn create_unit(&self, app: &App, index: usize) -> Result<Unit> {
        let unit_name = Unit::unit_name(&app.name, index);
        let (config, options) = converter::unit_container_config(app, &unit_name, &self.settings);

        #[allow(deprecated)]
        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(backend)?;

        if let Err(e) = self
            .docker
            .start_container(
                &created.id,
                None::<bollard::query_parameters::StartContainerOptions>,
            )
            .await
        {
            if let Err(cleanup) = self.remove_container(&created.id).await {
                warn!(
                    unit = %unit_name,
                    container = %created.id,
                    error = %cleanup,
                    "failed to remove unstarted container"
                );
            }
            return Err(backend(e));
        }

        debug!(unit = %unit_name, container = %created.id, "unit container started");
        self.inspect_unit(&UnitContainer {
            id: created.id,
            unit: unit_name,
        })
        .await
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        match self
            .docker
            .remove_container(
                id,
                Some(bollard::query_parameters::RemoveContainerOptions {
                    force: true,
                    ..Default::default()
                }),
            )
            .await
        {
            Ok(_)
            | Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(()),
            Err(e) => Err(backend(e)),
        }
    }

    /// Remove the containers and the network of a provision that failed
    /// part way
    async fn discard(&self, app: &App, containers: &[String]) {
        for id in containers {
            if let Err(e) = self.remove_container(id).await {
                warn!(app = %app.name, container = %id, error = %e, "failed to remove container");
            }
        }
        let network = self.settings.network_name(&app.name);
        if let Err(e) = self.docker.remove_network(&network).await {
            warn!(app = %app.name, network = %network, error = %e, "failed to remove network");
        }
    }

    /// Run one command in one container, streaming its output
    async fn exec_in(
        &self,
        container: &UnitContainer,
        stdout: Output<'_>,
        stderr: Output<'_>,
        command: Vec<String>,
    ) -> Result<()> {
        use bollard::container::LogOutput;
        use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};

        let exec_config = CreateExecOptions {
            cmd: Some(command),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };
        let message = self
            .docker
            .create_exec(&container.id, exec_config)
            .await
            .map_err(backend)?;

        let start_config = StartExecOptions {
            ..Default::default()
        };
        if let StartExecResults::Attached { mut output, .. } = self
            .docker
            .start_exec(&message.id, Some(start_config))
            .await
            .map_err(backend)?
        {
            while let Some(msg) = output.next().await {
                match msg.map_err(backend)? {
                    LogOutput::StdOut { message } | LogOutput::Console { message } => {
                        stdout.write_all(&message).await?;
                    }
                    LogOutput::StdErr { message } => {
                        stderr.write_all(&message).await?;
                    }
                    LogOutput::StdIn { .. } => {}
                }
            }
        }
        stdout.flush().await?;
        stderr.flush().await?;

        let inspect = self
            .docker
            .inspect_exec(&message.id)
            .await
            .map_err(backend)?;
        match inspect.exit_code {
            Some(code) if code != 0 => Err(ProvisionError::Command(format!(
                "{} exited with status {}",
                container.unit, code
            ))),
            _ => Ok(()),
        }
    }
}

fn unit_index(unit: &str) -> usize {
    unit.rsplit_once('/')
        .and_then(|(_, i)| i.parse().ok())
        .unwrap_or(0)
}

#[async_trait]
impl Provisioner for DockerProvisioner {
    fn name(&self) -> &str {
        "docker"
    }

    async fn provision(&self, app: &App) -> Result<()> {
        let network_config = bollard::models::NetworkCreateRequest {
            name: self.settings.network_name(&app.name),
            driver: Some("bridge".to_string()),
            ..Default::default()
        };

        match self.docker.create_network(network_config).await {
            Ok(_) => {}
            Err(DockerError::DockerResponseServerError {
                status_code: 409, ..
            }) => return Err(ProvisionError::AlreadyProvisioned(app.name.clone())),
            Err(e) => return Err(backend(e)),
        }

        let mut created = Vec::with_capacity(app.units.len());
        for index in 0..app.units.len() {
            match self.create_unit(app, index).await {
                Ok(unit) => created.push(unit.instance_id),
                Err(e) => {
                    self.discard(app, &created).await;
                    return Err(e);
                }
            }
        }
        info!(app = %app.name, units = app.units.len(), "app provisioned");
        Ok(())
    }

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>> {
        if n == 0 {
            return Err(ProvisionError::ZeroUnits);
        }
        self.ensure_provisioned(app).await?;

        let start = self
            .app_units(&app.name)
            .await?
            .iter()
            .map(|u| unit_index(&u.unit) + 1)
            .max()
            .unwrap_or(0);

        let mut added = Vec::with_capacity(n);
        for index in start..start + n {
            added.push(self.create_unit(app, index).await?);
        }
        Ok(added)
    }

    async fn remove_unit(&self, app: &App, unit_name: &str) -> Result<()> {
        self.ensure_provisioned(app).await?;
        let container = self
            .list_units(format!("{}={}", LABEL_UNIT, unit_name))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProvisionError::UnitNotFound(unit_name.to_string()))?;
        self.remove_container(&container.id).await
    }

    async fn restart(&self, app: &App) -> Result<()> {
        self.ensure_provisioned(app).await?;
        for container in self.app_units(&app.name).await? {
            self.docker
                .restart_container(
                    &container.id,
                    None::<bollard::query_parameters::RestartContainerOptions>,
                )
                .await
                .map_err(backend)?;
        }
        Ok(())
    }

    async fn destroy(&self, app: &App) -> Result<()> {
        self.ensure_provisioned(app).await?;
        for container in self.app_units(&app.name).await? {
            self.remove_container(&container.id).await?;
        }
        match self
            .docker
            .remove_network(&self.settings.network_name(&app.name))
            .await
        {
            Ok(_)
            | Err(DockerError::DockerResponseServerError {
                status_code: 404, ..
            }) => {}
            Err(e) => return Err(backend(e)),
        }
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
        let mut command = vec![cmd.to_string()];
        command.extend(args.iter().cloned());

        let units = self.app_units(&app.name).await?;
        let run = async {
            for container in &units {
                self.exec_in(container, &mut *stdout, &mut *stderr, command.clone())
                    .await?;
            }
            Ok::<(), ProvisionError>(())
        };
        match tokio::time::timeout(self.settings.exec_timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(ProvisionError::Timeout(format!(
                "{} on {} did not finish within {:?}",
                cmd, app.name, self.settings.exec_timeout
            ))),
        }
    }

    async fn collect_status(&self) -> Result<Vec<Unit>> {
        let mut units = Vec::new();
        for container in self.list_units(LABEL_APP.to_string()).await? {
            units.push(self.inspect_unit(&container).await?);
        }
        Ok(units)
    }

    async fn addr(&self, app: &App) -> Result<String> {
        Ok(format!("{}.{}", app.name, self.settings.domain))
    }
}
