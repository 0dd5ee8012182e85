//! Application lifecycle facade

use crate::actions::{
    AppContext, CreateParam, ENV_S3_ACCESS_KEY_ID, ENV_S3_BUCKET, Outcome, creation_pipeline,
};
use crate::error::{AppError, Result};
use fleetstack_action::Pipeline;
use fleetstack_core::{App, Unit, sort_units};
use fleetstack_provision::{Output, ProvisionError};
use fleetstack_queue::REGENERATE_CONFIGURATION;
use tracing::{info, warn};

/// Entry point for app lifecycle operations
pub struct AppManager {
    ctx: AppContext,
    pipeline: Pipeline<CreateParam, Outcome, AppError>,
}

impl AppManager {
    pub fn new(ctx: AppContext) -> Self {
        let pipeline = creation_pipeline(&ctx).with_observer(|action, err| {
            warn!(action, error = %err, "creation step could not be undone");
        });
        Self { ctx, pipeline }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Create an app with `units` units. On failure every completed step
    /// is undone and the pipeline error is returned.
    pub async fn create_app(&self, app: App, units: usize) -> Result<App> {
        let name = app.name.clone();
        self.pipeline
            .execute(&[CreateParam::App(app), CreateParam::UnitCount(units)])
            .await?;
        info!(app = %name, units, "app created");
        Ok(self.ctx.store.get_app(&name).await?)
    }

    /// Tear an app down. Only the store removal is mandatory; provisioner,
    /// repository and cloud cleanup failures are logged.
    pub async fn destroy_app(&self, name: &str) -> Result<()> {
        let app = self.ctx.store.get_app(name).await?;

        match self.ctx.provisioner.destroy(&app).await {
            Ok(()) | Err(ProvisionError::NotProvisioned(_)) => {}
            Err(e) => return Err(e.into()),
        }
        if let Err(e) = self.ctx.repository.delete(&app.name).await {
            warn!(app = %app.name, error = %e, "failed to remove repository");
        }
        self.release_cloud_resources(&app).await;

        self.ctx.store.remove_app(&app.name).await?;
        info!(app = %app.name, "app destroyed");
        Ok(())
    }

    async fn release_cloud_resources(&self, app: &App) {
        let identity = &self.ctx.identity;
        let policy = format!("app-{}-bucket", app.name);
        if let Err(e) = identity.delete_user_policy(&app.name, &policy).await {
            warn!(app = %app.name, error = %e, "failed to delete user policy");
        }
        if let Some(key) = app.env.get(ENV_S3_ACCESS_KEY_ID) {
            if let Err(e) = identity.delete_access_key(&key.value, &app.name).await {
                warn!(app = %app.name, error = %e, "failed to delete access key");
            }
        }
        if let Some(bucket) = app.env.get(ENV_S3_BUCKET) {
            if let Err(e) = self.ctx.storage.delete_bucket(&bucket.value).await {
                warn!(app = %app.name, error = %e, "failed to delete bucket");
            }
        }
        if let Err(e) = identity.delete_user(&app.name).await {
            warn!(app = %app.name, error = %e, "failed to delete user");
        }
    }

    /// Add `n` units, store them and schedule their configuration
    pub async fn add_units(&self, name: &str, n: usize) -> Result<Vec<Unit>> {
        let mut app = self.ctx.store.get_app(name).await?;
        let added = self.ctx.provisioner.add_units(&app, n).await?;

        app.units.extend(added.iter().cloned());
        self.ctx.store.update_app_units(&app.name, &app.units).await?;
        for unit in &added {
            self.ctx
                .queue
                .enqueue(
                    REGENERATE_CONFIGURATION,
                    vec![app.name.clone(), unit.name.clone()],
                )
                .await?;
        }
        info!(app = %app.name, added = added.len(), "units added");
        Ok(added)
    }

    pub async fn remove_unit(&self, name: &str, unit_name: &str) -> Result<()> {
        let mut app = self.ctx.store.get_app(name).await?;
        if app.find_unit(unit_name).is_none() {
            return Err(AppError::UnitNotFound(unit_name.to_string()));
        }

        self.ctx.provisioner.remove_unit(&app, unit_name).await?;
        app.units.retain(|u| u.name != unit_name);
        self.ctx.store.update_app_units(&app.name, &app.units).await?;
        info!(app = %app.name, unit = %unit_name, "unit removed");
        Ok(())
    }

    /// Run a command on every unit of the app
    pub async fn run_command(
        &self,
        name: &str,
        cmd: &str,
        args: &[String],
        stdout: Output<'_>,
        stderr: Output<'_>,
    ) -> Result<()> {
        let app = self.ctx.store.get_app(name).await?;
        self.ctx
            .provisioner
            .execute_command(stdout, stderr, &app, cmd, args)
            .await?;
        Ok(())
    }

    /// Refresh the app's units from the provisioner and return them
    /// ordered by status, failing units first
    pub async fn units_by_status(&self, name: &str) -> Result<Vec<Unit>> {
        let app = self.ctx.store.get_app(name).await?;
        let mut units: Vec<Unit> = self
            .ctx
            .provisioner
            .collect_status()
            .await?
            .into_iter()
            .filter(|u| u.app_name == app.name)
            .collect();
        self.ctx.store.update_app_units(&app.name, &units).await?;

        sort_units(&mut units);
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CloudOp;
    use crate::test_support::Harness;
    use fleetstack_action::PipelineError;
    use fleetstack_core::{ErrorKind, Store, Team, UnitStatus};
    use fleetstack_provision::Method;
    use fleetstack_queue::Queue;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn repository_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repository"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        server
    }

    async fn deletes(server: &MockServer) -> usize {
        server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "DELETE")
            .count()
    }

    fn new_app() -> App {
        App::new("earthshine", "django").with_teams(["metallica"])
    }

    #[tokio::test]
    async fn test_create_app_runs_every_step() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        h.store
            .insert_team(&Team::new("metallica", ["sad-but-true@metallica.com"]))
            .await
            .unwrap();
        let manager = AppManager::new(h.ctx.clone());

        let app = manager.create_app(new_app(), 3).await.unwrap();

        assert_eq!(app.units.len(), 3);
        assert_eq!(app.env["FLEETSTACK_APPNAME"].value, "earthshine");
        assert!(app.env["FLEETSTACK_S3_BUCKET"].value.starts_with("earthshine"));
        assert_eq!(h.provisioner.provisioned_apps().await, vec!["earthshine"]);
        assert_eq!(h.cloud.users().await, vec!["earthshine"]);
        assert!(h.cloud.policy("earthshine", "app-earthshine-bucket").await.is_some());
        assert_eq!(h.cloud.ingress_rules("fleetstack-earthshine").await.len(), 2);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "name": "earthshine",
                "users": ["sad-but-true@metallica.com"],
                "ispublic": false
            })
        );
        let message = h.queue.dequeue(Duration::from_millis(100)).await.unwrap();
        assert_eq!(message.args, vec!["earthshine"]);
    }

    #[tokio::test]
    async fn test_duplicate_app_rolls_back_nothing_of_its_own() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        let manager = AppManager::new(h.ctx.clone());
        manager.create_app(new_app(), 1).await.unwrap();

        let err = manager.create_app(new_app(), 1).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(h.store.app_count().await, 1);
        assert_eq!(h.cloud.users().await, vec!["earthshine"]);
        assert_eq!(h.provisioner.provisioned_apps().await, vec!["earthshine"]);
    }

    #[tokio::test]
    async fn test_provision_failure_unwinds_in_reverse() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        h.provisioner
            .prepare_failure(Method::Provision, ProvisionError::Backend("no capacity".to_string()))
            .await;
        let manager = AppManager::new(h.ctx.clone());

        let err = manager.create_app(new_app(), 2).await.unwrap_err();

        let AppError::Create(pipeline) = &err else {
            panic!("expected a pipeline error, got {err}");
        };
        assert_eq!(pipeline.action(), Some("provision-app"));
        assert!(pipeline.rollback_failures().is_empty());
        assert_eq!(err.kind(), ErrorKind::Remote);

        assert_eq!(deletes(&server).await, 1);
        assert!(h.cloud.policy("earthshine", "app-earthshine-bucket").await.is_none());
        assert!(h.cloud.buckets().await.is_empty());
        assert!(h.cloud.access_keys("earthshine").await.is_empty());
        assert!(h.cloud.users().await.is_empty());
        assert_eq!(h.store.app_count().await, 0);
        assert!(h.provisioner.provisioned_apps().await.is_empty());
    }

    #[tokio::test]
    async fn test_bucket_failure_stops_before_later_steps() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        h.cloud.prepare_failure(CloudOp::CreateBucket).await;
        let manager = AppManager::new(h.ctx.clone());

        let err = manager.create_app(new_app(), 1).await.unwrap_err();

        let AppError::Create(pipeline) = &err else {
            panic!("expected a pipeline error, got {err}");
        };
        assert!(matches!(pipeline.as_ref(), PipelineError::Forward { .. }));
        assert_eq!(pipeline.action(), Some("create-bucket"));
        assert!(server.received_requests().await.unwrap().is_empty());
        assert!(h.cloud.users().await.is_empty());
        assert_eq!(h.store.app_count().await, 0);
        assert!(h.queue.dequeue(Duration::from_millis(20)).await.is_err());
    }

    #[tokio::test]
    async fn test_destroy_app_releases_everything() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        let manager = AppManager::new(h.ctx.clone());
        manager.create_app(new_app(), 2).await.unwrap();

        manager.destroy_app("earthshine").await.unwrap();

        assert_eq!(h.store.app_count().await, 0);
        assert!(h.provisioner.provisioned_apps().await.is_empty());
        assert!(h.cloud.users().await.is_empty());
        assert!(h.cloud.buckets().await.is_empty());
        assert_eq!(deletes(&server).await, 1);
    }

    #[tokio::test]
    async fn test_add_and_remove_units() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        let manager = AppManager::new(h.ctx.clone());
        manager.create_app(new_app(), 1).await.unwrap();

        let added = manager.add_units("earthshine", 2).await.unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(h.store.get_app("earthshine").await.unwrap().units.len(), 3);

        let err = manager.add_units("earthshine", 0).await.unwrap_err();
        assert_eq!(err.to_string(), "Cannot add 0 units.");

        manager.remove_unit("earthshine", &added[0].name).await.unwrap();
        let units = h.store.get_app("earthshine").await.unwrap().units;
        assert_eq!(units.len(), 2);
        assert!(units.iter().all(|u| u.name != added[0].name));

        let err = manager.remove_unit("earthshine", "earthshine/9").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_run_command_streams_output() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        let manager = AppManager::new(h.ctx.clone());
        manager.create_app(new_app(), 1).await.unwrap();
        h.provisioner.prepare_output("total 0\n").await;
        let mut stdout: Vec<u8> = Vec::new();
        let mut stderr: Vec<u8> = Vec::new();

        manager
            .run_command("earthshine", "ls", &["-lh".to_string()], &mut stdout, &mut stderr)
            .await
            .unwrap();

        assert_eq!(stdout, b"total 0\n");
        assert_eq!(h.provisioner.get_cmds("ls", "earthshine").await.len(), 1);
    }

    #[tokio::test]
    async fn test_units_by_status() {
        let server = repository_server().await;
        let h = Harness::new(&server.uri());
        let manager = AppManager::new(h.ctx.clone());
        manager.create_app(new_app(), 3).await.unwrap();
        h.provisioner
            .set_unit_status("earthshine", "earthshine/1", UnitStatus::Error)
            .await
            .unwrap();
        h.provisioner
            .set_unit_status("earthshine", "earthshine/2", UnitStatus::Pending)
            .await
            .unwrap();

        let units = manager.units_by_status("earthshine").await.unwrap();

        let states: Vec<_> = units.iter().map(|u| u.state).collect();
        assert_eq!(
            states,
            vec![UnitStatus::Error, UnitStatus::Pending, UnitStatus::Started]
        );
    }
}
