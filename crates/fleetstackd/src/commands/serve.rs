use crate::{backend, manifest};
use colored::Colorize;
use fleetstack_app::RegenerateWorker;
use fleetstack_core::{MemoryStore, Store, StoreError, Unit, UnitStatus};
use fleetstack_provision::Provisioner;
use fleetstack_queue::{MemoryQueue, Queue, REGENERATE_CONFIGURATION};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Result of one synchronization pass
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Apps whose units were written back
    pub updated: usize,
    /// Regeneration messages enqueued
    pub scheduled: usize,
}

/// A unit needs its configuration written when it is started and was not
/// started at that address in the stored record.
fn came_up(unit: &Unit, previous: &[Unit]) -> bool {
    unit.state == UnitStatus::Started
        && !previous
            .iter()
            .any(|p| p.name == unit.name && p.ip == unit.ip && p.state == UnitStatus::Started)
}

/// Write the provisioner's view of every unit back to the stored apps and
/// schedule configuration regeneration for the units that came up. Apps the
/// store does not know are skipped.
pub async fn sync_units(
    store: &dyn Store,
    provisioner: &dyn Provisioner,
    queue: &dyn Queue,
) -> anyhow::Result<SyncReport> {
    let mut by_app: BTreeMap<String, Vec<Unit>> = BTreeMap::new();
    for unit in provisioner.collect_status().await? {
        by_app.entry(unit.app_name.clone()).or_default().push(unit);
    }

    let mut report = SyncReport::default();
    for (app, units) in &by_app {
        let stored = match store.get_app(app).await {
            Ok(stored) => stored,
            Err(StoreError::NotFound { .. }) => {
                debug!(app = %app, "skipping units of unknown app");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        store.update_app_units(app, units).await?;
        report.updated += 1;

        for unit in units.iter().filter(|u| came_up(u, &stored.units)) {
            queue
                .enqueue(REGENERATE_CONFIGURATION, vec![app.clone(), unit.name.clone()])
                .await?;
            report.scheduled += 1;
        }
    }
    Ok(report)
}

pub async fn handle(
    config: &fleetstack_config::Config,
    apps: Option<&Path>,
    poll_secs: u64,
    sync_secs: u64,
) -> anyhow::Result<()> {
    let provisioner = backend::build_provisioner(config).await?;
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new(config.queue.visibility_timeout()));

    if let Some(path) = apps {
        let registered = manifest::register(store.as_ref(), &manifest::load(path)?).await?;
        info!(apps = registered, path = %path.display(), "apps registered");
    } else {
        warn!("no app definitions given, only units of registered apps are tracked");
    }

    let worker = RegenerateWorker::with_parts(store.clone(), provisioner.clone(), queue.clone());
    let poll = Duration::from_secs(poll_secs.max(1));
    let worker_task = tokio::spawn(async move { worker.run(poll).await });

    let sync_store = store.clone();
    let sync_provisioner = provisioner.clone();
    let sync_queue = queue.clone();
    let sync_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(sync_secs.max(1)));
        loop {
            interval.tick().await;
            match sync_units(
                sync_store.as_ref(),
                sync_provisioner.as_ref(),
                sync_queue.as_ref(),
            )
            .await
            {
                Ok(report) => debug!(
                    apps = report.updated,
                    scheduled = report.scheduled,
                    "unit status synchronized"
                ),
                Err(e) => warn!(error = %e, "unit status synchronization failed"),
            }
        }
    });

    println!(
        "{}",
        format!("fleetstackd 起動 (provisioner: {})", provisioner.name()).green()
    );
    info!(poll_secs, sync_secs, "serving");

    tokio::signal::ctrl_c().await?;
    println!("{}", "停止しています...".yellow());
    worker_task.abort();
    sync_task.abort();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetstack_core::{App, EnvVar};
    use fleetstack_provision::FakeProvisioner;

    #[tokio::test]
    async fn test_sync_units_updates_known_apps_only() {
        let store = MemoryStore::new();
        let provisioner = FakeProvisioner::new();
        let queue = MemoryQueue::new(Duration::from_secs(60));

        let app = App::new("myapp", "python").with_units(vec![Unit::default(), Unit::default()]);
        store.insert_app(&App::new("myapp", "python")).await.unwrap();
        provisioner.provision(&app).await.unwrap();
        provisioner
            .provision(&App::new("ghost", "ruby").with_units(vec![Unit::default()]))
            .await
            .unwrap();

        let report = sync_units(&store, &provisioner, &queue).await.unwrap();

        assert_eq!(report, SyncReport {
            updated: 1,
            scheduled: 2,
        });
        let stored = store.get_app("myapp").await.unwrap();
        assert_eq!(stored.units.len(), 2);
        assert!(stored.units.iter().all(|u| u.app_name == "myapp"));
        assert!(store.get_app("ghost").await.is_err());
        assert_eq!(queue.ready_len().await, 2);
    }

    #[tokio::test]
    async fn test_only_units_that_come_up_are_scheduled() {
        let store = MemoryStore::new();
        let provisioner = FakeProvisioner::new();
        let queue = MemoryQueue::new(Duration::from_secs(60));
        let app = App::new("myapp", "python").with_units(vec![Unit::default(), Unit::default()]);
        store.insert_app(&App::new("myapp", "python")).await.unwrap();
        provisioner.provision(&app).await.unwrap();
        provisioner
            .set_unit_status("myapp", "myapp/1", UnitStatus::Pending)
            .await
            .unwrap();

        let first = sync_units(&store, &provisioner, &queue).await.unwrap();
        let unchanged = sync_units(&store, &provisioner, &queue).await.unwrap();
        provisioner
            .set_unit_status("myapp", "myapp/1", UnitStatus::Started)
            .await
            .unwrap();
        let started = sync_units(&store, &provisioner, &queue).await.unwrap();

        assert_eq!(first.scheduled, 1);
        assert_eq!(unchanged.scheduled, 0);
        assert_eq!(started.scheduled, 1);
        let message = queue.dequeue(Duration::from_millis(50)).await.unwrap();
        assert_eq!(message.args, vec!["myapp", "myapp/0"]);
    }

    #[tokio::test]
    async fn test_registered_app_gets_apprc_once_its_units_run() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let provisioner = Arc::new(FakeProvisioner::new());
        let queue: Arc<dyn Queue> = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
        let mut app = App::new("myapp", "python");
        app.set_envs([EnvVar::new("DATABASE_HOST", "db.internal")]);
        store.insert_app(&app).await.unwrap();
        provisioner
            .provision(&app.clone().with_units(vec![Unit::default()]))
            .await
            .unwrap();
        provisioner.prepare_output("").await;
        let worker =
            RegenerateWorker::with_parts(store.clone(), provisioner.clone(), queue.clone());

        sync_units(store.as_ref(), provisioner.as_ref(), queue.as_ref())
            .await
            .unwrap();
        assert!(worker.process_next(Duration::from_millis(100)).await.unwrap());

        let cmds = provisioner.get_cmds("sh", "myapp").await;
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].args[1].contains("export DATABASE_HOST='db.internal'"));
    }
}
