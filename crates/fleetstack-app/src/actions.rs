//! App creation pipeline actions
//!
//! Every action receives `[CreateParam::App, CreateParam::UnitCount]` and
//! the previous action's [`Outcome`]. Steps that create something
//! external delete it again in `backward`.

use crate::cloud::{AccessKey, CloudError, IamUser, IdentityApi, SecurityGroupApi, StorageApi};
use crate::error::{AppError, Result};
use crate::repository::RepositoryClient;
use async_trait::async_trait;
use fleetstack_action::{Action, BackwardContext, ForwardContext, Pipeline};
use fleetstack_core::{App, EnvVar, StoreError, Store};
use fleetstack_provision::Provisioner;
use fleetstack_queue::{Queue, REGENERATE_CONFIGURATION};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Owner tag of the storage variables
pub const S3_INSTANCE_NAME: &str = "fleetstack-s3";

pub const ENV_APPNAME: &str = "FLEETSTACK_APPNAME";
pub const ENV_HOST: &str = "FLEETSTACK_HOST";
pub const ENV_S3_ENDPOINT: &str = "FLEETSTACK_S3_ENDPOINT";
pub const ENV_S3_LOCATION_CONSTRAINT: &str = "FLEETSTACK_S3_LOCATIONCONSTRAINT";
pub const ENV_S3_ACCESS_KEY_ID: &str = "FLEETSTACK_S3_ACCESS_KEY_ID";
pub const ENV_S3_SECRET_KEY: &str = "FLEETSTACK_S3_SECRET_KEY";
pub const ENV_S3_BUCKET: &str = "FLEETSTACK_S3_BUCKET";

const EXPORTED_ENV: [&str; 7] = [
    ENV_APPNAME,
    ENV_HOST,
    ENV_S3_ENDPOINT,
    ENV_S3_LOCATION_CONSTRAINT,
    ENV_S3_ACCESS_KEY_ID,
    ENV_S3_SECRET_KEY,
    ENV_S3_BUCKET,
];

/// Pipeline parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateParam {
    App(App),
    UnitCount(usize),
}

/// Result of one pipeline step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    App(App),
    User(IamUser),
    AccessKey(AccessKey),
    Storage(StorageEnv),
    Nothing,
}

/// Storage credentials and location exported to the app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEnv {
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub endpoint: String,
    pub location_constraint: bool,
}

impl StorageEnv {
    fn env_vars(&self) -> Vec<EnvVar> {
        [
            (ENV_S3_ENDPOINT, self.endpoint.clone()),
            (ENV_S3_LOCATION_CONSTRAINT, self.location_constraint.to_string()),
            (ENV_S3_ACCESS_KEY_ID, self.access_key.clone()),
            (ENV_S3_SECRET_KEY, self.secret_key.clone()),
            (ENV_S3_BUCKET, self.bucket.clone()),
        ]
        .into_iter()
        .map(|(name, value)| EnvVar::owned_by(name, value, S3_INSTANCE_NAME))
        .collect()
    }
}

/// アプリ作成で使う設定値
#[derive(Debug, Clone)]
pub struct AppSettings {
    /// `FLEETSTACK_HOST` に書き出す API ホスト
    pub host: String,
    pub s3_endpoint: String,
    pub s3_location_constraint: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            s3_endpoint: "https://s3.amazonaws.com".to_string(),
            s3_location_constraint: true,
        }
    }
}

/// Collaborators shared by the pipeline, the manager and the worker
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn Store>,
    pub provisioner: Arc<dyn Provisioner>,
    pub queue: Arc<dyn Queue>,
    pub identity: Arc<dyn IdentityApi>,
    pub storage: Arc<dyn StorageApi>,
    pub security_groups: Arc<dyn SecurityGroupApi>,
    pub repository: RepositoryClient,
    pub settings: AppSettings,
}

type Forward<'a> = ForwardContext<'a, CreateParam, Outcome>;
type Backward<'a> = BackwardContext<'a, CreateParam, Outcome>;
type BoxedAction = Box<dyn Action<CreateParam, Outcome, AppError>>;

fn app_param(params: &[CreateParam]) -> Result<&App> {
    match params.first() {
        Some(CreateParam::App(app)) => Ok(app),
        _ => Err(AppError::InvalidParam("First parameter must be an app.")),
    }
}

fn unit_count_param(params: &[CreateParam]) -> Result<usize> {
    match params.get(1) {
        Some(CreateParam::UnitCount(n)) => Ok(*n),
        _ => Err(AppError::InvalidParam("Second parameter must be a unit count.")),
    }
}

fn bucket_name(app: &str) -> String {
    format!("{}{:08x}", app, rand::random::<u32>())
}

/// Ports opened on every app's security group
const INGRESS_PORTS: [u16; 2] = [22, 80];

fn security_group_name(app: &str) -> String {
    format!("fleetstack-{}", app)
}

fn policy_name(app: &str) -> String {
    format!("app-{}-bucket", app)
}

fn bucket_policy(bucket: &str) -> String {
    serde_json::json!({
        "Statement": [{
            "Effect": "Allow",
            "Action": "s3:*",
            "Resource": [
                format!("arn:aws:s3:::{}/*", bucket),
                format!("arn:aws:s3:::{}", bucket),
            ],
        }]
    })
    .to_string()
}

/// Build the creation pipeline over `ctx`
pub fn creation_pipeline(ctx: &AppContext) -> Pipeline<CreateParam, Outcome, AppError> {
    let actions: Vec<BoxedAction> = vec![
        Box::new(InsertApp {
            store: ctx.store.clone(),
        }),
        Box::new(CreateIamUser {
            identity: ctx.identity.clone(),
        }),
        Box::new(CreateIamAccessKey {
            identity: ctx.identity.clone(),
        }),
        Box::new(CreateBucket {
            storage: ctx.storage.clone(),
            settings: ctx.settings.clone(),
        }),
        Box::new(CreateUserPolicy {
            identity: ctx.identity.clone(),
        }),
        Box::new(AuthorizeSecurityGroup {
            security_groups: ctx.security_groups.clone(),
        }),
        Box::new(ExportEnvironment {
            store: ctx.store.clone(),
            queue: ctx.queue.clone(),
            settings: ctx.settings.clone(),
        }),
        Box::new(CreateRepository {
            store: ctx.store.clone(),
            repository: ctx.repository.clone(),
        }),
        Box::new(ProvisionApp {
            provisioner: ctx.provisioner.clone(),
        }),
        Box::new(ProvisionAddUnits {
            store: ctx.store.clone(),
            provisioner: ctx.provisioner.clone(),
        }),
    ];
    Pipeline::new(actions)
}

/// Store the app record
pub struct InsertApp {
    pub store: Arc<dyn Store>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for InsertApp {
    fn name(&self) -> &str {
        "insert-app"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        self.store.insert_app(app).await?;
        info!(app = %app.name, "app record inserted");
        Ok(Outcome::App(app.clone()))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        let app = app_param(ctx.params)?;
        self.store.remove_app(&app.name).await?;
        Ok(())
    }
}

/// Create the app's cloud identity
pub struct CreateIamUser {
    pub identity: Arc<dyn IdentityApi>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for CreateIamUser {
    fn name(&self) -> &str {
        "create-iam-user"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let user = self.identity.create_user(&app.name).await?;
        Ok(Outcome::User(user))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        if let Outcome::User(user) = ctx.result {
            self.identity.delete_user(&user.name).await?;
        }
        Ok(())
    }
}

pub struct CreateIamAccessKey {
    pub identity: Arc<dyn IdentityApi>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for CreateIamAccessKey {
    fn name(&self) -> &str {
        "create-iam-access-key"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let Some(Outcome::User(user)) = ctx.previous else {
            return Err(AppError::InvalidParam("Previous result must be a user."));
        };
        let key = self.identity.create_access_key(&user.name).await?;
        Ok(Outcome::AccessKey(key))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        if let Outcome::AccessKey(key) = ctx.result {
            self.identity
                .delete_access_key(&key.id, &key.user_name)
                .await?;
        }
        Ok(())
    }
}

/// Create the app's bucket and hand out its storage environment
pub struct CreateBucket {
    pub storage: Arc<dyn StorageApi>,
    pub settings: AppSettings,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for CreateBucket {
    fn name(&self) -> &str {
        "create-bucket"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let Some(Outcome::AccessKey(key)) = ctx.previous else {
            return Err(AppError::InvalidParam("Previous result must be an access key."));
        };
        let bucket = bucket_name(&app.name);
        self.storage.create_bucket(&bucket).await?;
        info!(app = %app.name, bucket = %bucket, "bucket created");

        Ok(Outcome::Storage(StorageEnv {
            access_key: key.id.clone(),
            secret_key: key.secret.clone(),
            bucket,
            endpoint: self.settings.s3_endpoint.clone(),
            location_constraint: self.settings.s3_location_constraint,
        }))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        if let Outcome::Storage(env) = ctx.result {
            self.storage.delete_bucket(&env.bucket).await?;
        }
        Ok(())
    }
}

/// Grant the app's user full access to its bucket
pub struct CreateUserPolicy {
    pub identity: Arc<dyn IdentityApi>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for CreateUserPolicy {
    fn name(&self) -> &str {
        "create-user-policy"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let Some(Outcome::Storage(env)) = ctx.previous else {
            return Err(AppError::InvalidParam("Previous result must be a storage environment."));
        };
        self.identity
            .put_user_policy(&app.name, &policy_name(&app.name), &bucket_policy(&env.bucket))
            .await?;
        Ok(Outcome::Storage(env.clone()))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        let app = app_param(ctx.params)?;
        self.identity
            .delete_user_policy(&app.name, &policy_name(&app.name))
            .await?;
        Ok(())
    }
}

/// Open ssh and http on the app's security group
///
/// Rules the group already has are accepted. Nothing is revoked on
/// rollback since the group may have held the rules before.
pub struct AuthorizeSecurityGroup {
    pub security_groups: Arc<dyn SecurityGroupApi>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for AuthorizeSecurityGroup {
    fn name(&self) -> &str {
        "authorize-security-group"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let group = security_group_name(&app.name);
        for port in INGRESS_PORTS {
            match self.security_groups.authorize_ingress(&group, "tcp", port).await {
                Ok(()) => {}
                Err(CloudError::AlreadyExists(rule)) => {
                    info!(app = %app.name, rule = %rule, "ingress rule already present")
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!(app = %app.name, group = %group, "security group authorized");
        Ok(ctx.previous.cloned().unwrap_or(Outcome::Nothing))
    }

    async fn backward(&self, _ctx: Backward<'_>) -> Result<()> {
        Ok(())
    }
}

/// Write the platform and storage variables and schedule configuration
/// regeneration
pub struct ExportEnvironment {
    pub store: Arc<dyn Store>,
    pub queue: Arc<dyn Queue>,
    pub settings: AppSettings,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for ExportEnvironment {
    fn name(&self) -> &str {
        "export-environment"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let mut stored = self.store.get_app(&app.name).await?;

        let mut vars = vec![
            EnvVar::new(ENV_APPNAME, app.name.as_str()),
            EnvVar::new(ENV_HOST, self.settings.host.as_str()),
        ];
        if let Some(Outcome::Storage(env)) = ctx.previous {
            vars.extend(env.env_vars());
        }
        stored.set_envs(vars);
        self.store.update_app_env(&stored.name, &stored.env).await?;

        if stored.units.is_empty() {
            self.queue
                .enqueue(REGENERATE_CONFIGURATION, vec![stored.name.clone()])
                .await?;
        } else {
            for unit in &stored.units {
                self.queue
                    .enqueue(
                        REGENERATE_CONFIGURATION,
                        vec![stored.name.clone(), unit.name.clone()],
                    )
                    .await?;
            }
        }

        Ok(ctx.previous.cloned().unwrap_or(Outcome::Nothing))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        let app = app_param(ctx.params)?;
        let mut stored = self.store.get_app(&app.name).await?;
        stored.unset_envs(&EXPORTED_ENV);
        self.store.update_app_env(&stored.name, &stored.env).await?;
        Ok(())
    }
}

/// Create the app's git repository for every user of its teams
pub struct CreateRepository {
    pub store: Arc<dyn Store>,
    pub repository: RepositoryClient,
}

impl CreateRepository {
    async fn team_users(&self, app: &App) -> Result<Vec<String>> {
        let mut users: Vec<String> = Vec::new();
        for team in &app.teams {
            match self.store.get_team(team).await {
                Ok(team) => {
                    for user in team.users {
                        if !users.contains(&user) {
                            users.push(user);
                        }
                    }
                }
                Err(StoreError::NotFound { .. }) => {
                    warn!(app = %app.name, team = %team, "team not found, skipping its users");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(users)
    }
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for CreateRepository {
    fn name(&self) -> &str {
        "create-repository"
    }

    fn min_params(&self) -> usize {
        1
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let users = self.team_users(app).await?;
        self.repository.create(&app.name, &users, false).await?;
        info!(app = %app.name, users = users.len(), "repository created");
        Ok(Outcome::App(app.clone()))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        let app = app_param(ctx.params)?;
        self.repository.delete(&app.name).await
    }
}

pub struct ProvisionApp {
    pub provisioner: Arc<dyn Provisioner>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for ProvisionApp {
    fn name(&self) -> &str {
        "provision-app"
    }

    fn min_params(&self) -> usize {
        2
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        self.provisioner.provision(app).await?;
        info!(app = %app.name, provisioner = self.provisioner.name(), "app provisioned");
        Ok(Outcome::App(app.clone()))
    }

    async fn backward(&self, ctx: Backward<'_>) -> Result<()> {
        let app = app_param(ctx.params)?;
        self.provisioner.destroy(app).await?;
        Ok(())
    }
}

/// Top the app up to the requested unit count and store its units
pub struct ProvisionAddUnits {
    pub store: Arc<dyn Store>,
    pub provisioner: Arc<dyn Provisioner>,
}

#[async_trait]
impl Action<CreateParam, Outcome, AppError> for ProvisionAddUnits {
    fn name(&self) -> &str {
        "provision-add-units"
    }

    fn min_params(&self) -> usize {
        2
    }

    async fn forward(&self, ctx: Forward<'_>) -> Result<Outcome> {
        let app = app_param(ctx.params)?;
        let target = unit_count_param(ctx.params)?;

        let missing = target.saturating_sub(app.units.len());
        if missing > 0 {
            self.provisioner.add_units(app, missing).await?;
        }

        let units: Vec<_> = self
            .provisioner
            .collect_status()
            .await?
            .into_iter()
            .filter(|u| u.app_name == app.name)
            .collect();
        self.store.update_app_units(&app.name, &units).await?;
        info!(app = %app.name, units = units.len(), "units stored");
        Ok(Outcome::Nothing)
    }
}
