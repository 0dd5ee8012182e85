//! Unit configuration (`apprc`) regeneration

use crate::actions::AppContext;
use crate::error::{AppError, Result};
use fleetstack_core::{App, Store, StoreError};
use fleetstack_provision::Provisioner;
use fleetstack_queue::{Message, Queue, QueueError, REGENERATE_CONFIGURATION};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Location of the generated file on every unit
pub const APPRC_PATH: &str = "/home/application/apprc";

const HEREDOC_MARKER: &str = "FLEETSTACK_APPRC_EOF";

/// Render the app environment as a shell file of `export` lines
pub fn render_apprc(app: &App) -> String {
    let mut out = String::from("# generated by fleetstack, do not edit\n");
    for var in app.env.values() {
        out.push_str(&format!("export {}={}\n", var.name, shell_quote(&var.value)));
    }
    out
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Consumes `regenerate-configuration` messages and writes the app's
/// `apprc` to its units
pub struct RegenerateWorker {
    store: Arc<dyn Store>,
    provisioner: Arc<dyn Provisioner>,
    queue: Arc<dyn Queue>,
}

impl RegenerateWorker {
    pub fn new(ctx: &AppContext) -> Self {
        Self::with_parts(ctx.store.clone(), ctx.provisioner.clone(), ctx.queue.clone())
    }

    /// Build a worker without the cloud collaborators of a full context
    pub fn with_parts(
        store: Arc<dyn Store>,
        provisioner: Arc<dyn Provisioner>,
        queue: Arc<dyn Queue>,
    ) -> Self {
        Self {
            store,
            provisioner,
            queue,
        }
    }

    /// Handle one message. Returns `false` when none arrived within
    /// `timeout`. A message whose handling fails stays in the queue and is
    /// delivered again; one naming an app that no longer exists is deleted.
    pub async fn process_next(&self, timeout: Duration) -> Result<bool> {
        let message = match self.queue.dequeue(timeout).await {
            Ok(message) => message,
            Err(QueueError::Timeout(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if message.action != REGENERATE_CONFIGURATION {
            warn!(id = message.id, action = %message.action, "dropping message with unknown action");
            self.queue.delete(&message).await?;
            return Ok(true);
        }
        let Some(app_name) = message.args.first() else {
            warn!(id = message.id, "dropping message without app name");
            self.queue.delete(&message).await?;
            return Ok(true);
        };

        let app = match self.store.get_app(app_name).await {
            Ok(app) => app,
            Err(StoreError::NotFound { .. }) => {
                warn!(id = message.id, app = %app_name, "dropping message for removed app");
                self.queue.delete(&message).await?;
                return Ok(true);
            }
            Err(e) => return Err(e.into()),
        };

        self.regenerate(&app, &message).await?;
        self.queue.delete(&message).await?;
        Ok(true)
    }

    async fn regenerate(&self, app: &App, message: &Message) -> Result<()> {
        let script = format!(
            "cat > {} <<'{marker}'\n{}{marker}\n",
            APPRC_PATH,
            render_apprc(app),
            marker = HEREDOC_MARKER
        );
        debug!(app = %app.name, unit = ?message.args.get(1), delivery = message.deliveries, "writing apprc");

        let mut stdout = tokio::io::sink();
        let mut stderr = tokio::io::sink();
        self.provisioner
            .execute_command(&mut stdout, &mut stderr, app, "sh", &["-c".to_string(), script])
            .await
            .map_err(AppError::from)?;

        info!(app = %app.name, vars = app.env.len(), "apprc regenerated");
        Ok(())
    }

    /// Process messages until the task is dropped
    pub async fn run(&self, poll: Duration) {
        loop {
            if let Err(e) = self.process_next(poll).await {
                warn!(error = %e, "configuration regeneration failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use fleetstack_core::EnvVar;
    use fleetstack_provision::{Method, ProvisionError};

    async fn app_with_env(h: &Harness) -> App {
        let mut app = App::new("myapp", "python");
        app.set_envs([
            EnvVar::new("FLEETSTACK_APPNAME", "myapp"),
            EnvVar::owned_by("DATABASE_PASSWORD", "it's s3cr3t", "my-mysql"),
        ]);
        h.store.insert_app(&app).await.unwrap();
        app
    }

    #[test]
    fn test_render_apprc_quotes_values() {
        let mut app = App::new("myapp", "python");
        app.set_envs([EnvVar::new("B", "it's"), EnvVar::new("A", "1")]);

        assert_eq!(
            render_apprc(&app),
            "# generated by fleetstack, do not edit\nexport A='1'\nexport B='it'\\''s'\n"
        );
    }

    #[tokio::test]
    async fn test_message_writes_apprc_and_is_deleted() {
        let h = Harness::without_repository();
        app_with_env(&h).await;
        h.provisioner.prepare_output("").await;
        h.queue
            .enqueue(REGENERATE_CONFIGURATION, vec!["myapp".to_string()])
            .await
            .unwrap();
        let worker = RegenerateWorker::new(&h.ctx);

        assert!(worker.process_next(Duration::from_millis(100)).await.unwrap());

        let cmds = h.provisioner.get_cmds("sh", "myapp").await;
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].args[0], "-c");
        assert!(cmds[0].args[1].starts_with("cat > /home/application/apprc"));
        assert!(cmds[0].args[1].contains("export FLEETSTACK_APPNAME='myapp'"));
        assert_eq!(h.queue.ready_len().await, 0);
        assert_eq!(h.queue.in_flight_len().await, 0);
    }

    #[tokio::test]
    async fn test_failed_message_stays_in_flight() {
        let h = Harness::without_repository();
        app_with_env(&h).await;
        h.provisioner
            .prepare_failure(Method::ExecuteCommand, ProvisionError::Command("boom".to_string()))
            .await;
        h.queue
            .enqueue(REGENERATE_CONFIGURATION, vec!["myapp".to_string(), "myapp/0".to_string()])
            .await
            .unwrap();
        let worker = RegenerateWorker::new(&h.ctx);

        let err = worker.process_next(Duration::from_millis(100)).await.unwrap_err();

        assert!(matches!(err, AppError::Provision(ProvisionError::Command(_))));
        assert_eq!(h.queue.in_flight_len().await, 1);
    }

    #[tokio::test]
    async fn test_idle_queue_and_unknown_action() {
        let h = Harness::without_repository();
        let worker = RegenerateWorker::new(&h.ctx);

        assert!(!worker.process_next(Duration::from_millis(20)).await.unwrap());

        h.queue.enqueue("reticulate-splines", Vec::new()).await.unwrap();
        assert!(worker.process_next(Duration::from_millis(100)).await.unwrap());
        assert_eq!(h.queue.in_flight_len().await, 0);
    }

    #[tokio::test]
    async fn test_message_for_removed_app_is_deleted() {
        let h = Harness::without_repository();
        h.queue
            .enqueue(REGENERATE_CONFIGURATION, vec!["gone".to_string()])
            .await
            .unwrap();
        let worker = RegenerateWorker::new(&h.ctx);

        assert!(worker.process_next(Duration::from_millis(100)).await.unwrap());

        assert_eq!(h.queue.ready_len().await, 0);
        assert_eq!(h.queue.in_flight_len().await, 0);
        assert!(h.provisioner.get_cmds("sh", "gone").await.is_empty());
        assert!(!worker.process_next(Duration::from_millis(20)).await.unwrap());
    }
}
