//! Bind / unbind state transitions

use crate::client::ServiceClient;
use crate::error::{BindError, Result};
use fleetstack_core::{App, EnvVar, ServiceInstance, Store};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives bind and unbind for (instance, app) pairs
///
/// Both operations take the in-memory records by `&mut` and leave them
/// matching what was persisted, including after a failed bind.
pub struct Binder {
    store: Arc<dyn Store>,
    client: ServiceClient,
}

impl Binder {
    pub fn new(store: Arc<dyn Store>, client: ServiceClient) -> Self {
        Self { store, client }
    }

    async fn endpoint(&self, instance: &ServiceInstance) -> Result<String> {
        let service = self.store.get_service(&instance.service_name).await?;
        self.client.endpoint(&service)
    }

    /// Bind `app` to `instance`
    pub async fn bind(&self, instance: &mut ServiceInstance, app: &mut App) -> Result<()> {
        let ip = app
            .primary_address()
            .ok_or(BindError::NoAddress)?
            .to_string();
        if instance.is_bound(&app.name) {
            return Err(BindError::AlreadyBound);
        }

        let endpoint = self.endpoint(instance).await?;
        let vars = match self.client.bind(&endpoint, &instance.name, &ip).await {
            Ok(vars) => vars,
            Err(e @ BindError::InvalidResponse(_)) => {
                warn!(instance = %instance.name, app = %app.name, error = %e, "bind response unreadable, unbinding");
                self.compensate_bind(&endpoint, instance, app, &ip).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let previous_apps = instance.apps.clone();
        let previous_env = app.env.clone();
        instance.add_app(&app.name);
        app.set_envs(
            vars.into_iter()
                .map(|(name, value)| EnvVar::owned_by(name, value, instance.name.as_str())),
        );

        if let Err(e) = self.persist_bind(instance, app, &previous_apps).await {
            warn!(
                instance = %instance.name,
                app = %app.name,
                error = %e,
                "bind could not be persisted, unbinding"
            );
            self.compensate_bind(&endpoint, instance, app, &ip).await;
            instance.apps = previous_apps;
            app.env = previous_env;
            return Err(e);
        }

        info!(instance = %instance.name, app = %app.name, "app bound");
        Ok(())
    }

    /// Best-effort remote unbind after the service accepted a bind that
    /// could not be completed locally
    async fn compensate_bind(
        &self,
        endpoint: &str,
        instance: &ServiceInstance,
        app: &App,
        ip: &str,
    ) {
        if let Err(e) = self.client.unbind(endpoint, &instance.name, ip).await {
            warn!(instance = %instance.name, app = %app.name, error = %e, "compensating unbind failed");
        }
    }

    /// Persist the instance membership, then the app env. When the env
    /// write fails the membership write is reverted. Shared by bind and
    /// unbind.
    async fn persist_bind(
        &self,
        instance: &ServiceInstance,
        app: &App,
        previous_apps: &[String],
    ) -> Result<()> {
        self.store
            .update_instance_apps(&instance.name, &instance.apps)
            .await?;

        if let Err(e) = self.store.update_app_env(&app.name, &app.env).await {
            if let Err(revert) = self
                .store
                .update_instance_apps(&instance.name, previous_apps)
                .await
            {
                warn!(instance = %instance.name, error = %revert, "failed to revert instance apps");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Unbind `app` from `instance`
    ///
    /// Local state is persisted first; when either write fails the stored
    /// membership and the in-memory records are restored and the service is
    /// not called. The remote call then runs in a detached task and its
    /// failure is only logged.
    pub async fn unbind(&self, instance: &mut ServiceInstance, app: &mut App) -> Result<()> {
        if !instance.is_bound(&app.name) {
            return Err(BindError::NotBound);
        }
        let endpoint = self.endpoint(instance).await?;

        let previous_apps = instance.apps.clone();
        let previous_env = app.env.clone();
        instance.remove_app(&app.name);
        let removed = app.unset_instance_env(&instance.name);

        if let Err(e) = self.persist_bind(instance, app, &previous_apps).await {
            warn!(instance = %instance.name, app = %app.name, error = %e, "unbind could not be persisted");
            instance.apps = previous_apps;
            app.env = previous_env;
            return Err(e);
        }

        match app.primary_address() {
            Some(ip) => {
                let client = self.client.clone();
                let instance_name = instance.name.clone();
                let ip = ip.to_string();
                tokio::spawn(async move {
                    if let Err(e) = client.unbind(&endpoint, &instance_name, &ip).await {
                        warn!(instance = %instance_name, hostname = %ip, error = %e, "remote unbind failed");
                    }
                });
            }
            None => warn!(
                instance = %instance.name,
                app = %app.name,
                "app has no address, skipping remote unbind"
            ),
        }

        info!(instance = %instance.name, app = %app.name, removed, "app unbound");
        Ok(())
    }
}
