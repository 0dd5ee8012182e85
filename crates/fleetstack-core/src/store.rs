//! Persistence contract
//!
//! The control plane never talks to a document database directly; every
//! component receives a `Store` at construction time. `MemoryStore` is the
//! in-process implementation used by the daemon and by tests.

use crate::error::{Result, StoreError};
use crate::model::{App, EnvVar, Service, ServiceInstance, Team, Unit};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a new app. Fails with `Conflict` when the name is taken.
    async fn insert_app(&self, app: &App) -> Result<()>;

    async fn get_app(&self, name: &str) -> Result<App>;

    async fn remove_app(&self, name: &str) -> Result<()>;

    /// Replace the whole environment of an app.
    async fn update_app_env(&self, name: &str, env: &BTreeMap<String, EnvVar>) -> Result<()>;

    /// Replace the unit list of an app.
    async fn update_app_units(&self, name: &str, units: &[Unit]) -> Result<()>;

    async fn insert_team(&self, team: &Team) -> Result<()>;

    async fn get_team(&self, name: &str) -> Result<Team>;

    async fn insert_service(&self, service: &Service) -> Result<()>;

    async fn get_service(&self, name: &str) -> Result<Service>;

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<()>;

    async fn get_instance(&self, name: &str) -> Result<ServiceInstance>;

    /// Replace the bound-app list of a service instance.
    async fn update_instance_apps(&self, name: &str, apps: &[String]) -> Result<()>;
}

#[derive(Default)]
struct Collections {
    apps: HashMap<String, App>,
    teams: HashMap<String, Team>,
    services: HashMap<String, Service>,
    instances: HashMap<String, ServiceInstance>,
}

/// In-memory `Store` guarded by a single `RwLock`.
///
/// Inserts check and write under the same write guard, so the first writer
/// wins on a duplicate name.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Collections>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored apps
    pub async fn app_count(&self) -> usize {
        self.inner.read().await.apps.len()
    }
}

fn insert_unique<T: Clone>(
    map: &mut HashMap<String, T>,
    collection: &'static str,
    name: &str,
    value: &T,
) -> Result<()> {
    if map.contains_key(name) {
        return Err(StoreError::Conflict {
            collection,
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), value.clone());
    Ok(())
}

fn lookup<'a, T>(
    map: &'a HashMap<String, T>,
    collection: &'static str,
    name: &str,
) -> Result<&'a T> {
    map.get(name).ok_or_else(|| StoreError::NotFound {
        collection,
        name: name.to_string(),
    })
}

fn lookup_mut<'a, T>(
    map: &'a mut HashMap<String, T>,
    collection: &'static str,
    name: &str,
) -> Result<&'a mut T> {
    map.get_mut(name).ok_or_else(|| StoreError::NotFound {
        collection,
        name: name.to_string(),
    })
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_app(&self, app: &App) -> Result<()> {
        let mut inner = self.inner.write().await;
        insert_unique(&mut inner.apps, "app", &app.name, app)?;
        debug!(app = %app.name, "app inserted");
        Ok(())
    }

    async fn get_app(&self, name: &str) -> Result<App> {
        let inner = self.inner.read().await;
        lookup(&inner.apps, "app", name).cloned()
    }

    async fn remove_app(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner
            .apps
            .remove(name)
            .map(|_| debug!(app = %name, "app removed"))
            .ok_or_else(|| StoreError::NotFound {
                collection: "app",
                name: name.to_string(),
            })
    }

    async fn update_app_env(&self, name: &str, env: &BTreeMap<String, EnvVar>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let app = lookup_mut(&mut inner.apps, "app", name)?;
        app.env = env.clone();
        debug!(app = %name, vars = env.len(), "app env updated");
        Ok(())
    }

    async fn update_app_units(&self, name: &str, units: &[Unit]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let app = lookup_mut(&mut inner.apps, "app", name)?;
        app.units = units.to_vec();
        debug!(app = %name, units = units.len(), "app units updated");
        Ok(())
    }

    async fn insert_team(&self, team: &Team) -> Result<()> {
        let mut inner = self.inner.write().await;
        insert_unique(&mut inner.teams, "team", &team.name, team)
    }

    async fn get_team(&self, name: &str) -> Result<Team> {
        let inner = self.inner.read().await;
        lookup(&inner.teams, "team", name).cloned()
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        let mut inner = self.inner.write().await;
        insert_unique(&mut inner.services, "service", &service.name, service)
    }

    async fn get_service(&self, name: &str) -> Result<Service> {
        let inner = self.inner.read().await;
        lookup(&inner.services, "service", name).cloned()
    }

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<()> {
        let mut inner = self.inner.write().await;
        insert_unique(&mut inner.instances, "service instance", &instance.name, instance)
    }

    async fn get_instance(&self, name: &str) -> Result<ServiceInstance> {
        let inner = self.inner.read().await;
        lookup(&inner.instances, "service instance", name).cloned()
    }

    async fn update_instance_apps(&self, name: &str, apps: &[String]) -> Result<()> {
        let mut inner = self.inner.write().await;
        let instance = lookup_mut(&mut inner.instances, "service instance", name)?;
        instance.apps = apps.to_vec();
        debug!(instance = %name, apps = apps.len(), "instance apps updated");
        Ok(())
    }
}
