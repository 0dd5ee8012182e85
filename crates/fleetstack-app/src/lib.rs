//! FleetStack application lifecycle
//!
//! App creation runs as an action pipeline: the app record, its cloud
//! identity and storage, its security group, the exported environment, the
//! git repository and finally the provisioned units. Any failing step unwinds the ones before
//! it. [`AppManager`] is the entry point; [`RegenerateWorker`] consumes the
//! configuration messages the pipeline enqueues.

pub mod actions;
pub mod apprc;
pub mod cloud;
pub mod error;
pub mod manager;
pub mod repository;

#[cfg(test)]
mod test_support;

pub use actions::{AppContext, AppSettings, CreateParam, Outcome, StorageEnv, creation_pipeline};
pub use apprc::{RegenerateWorker, render_apprc};
pub use cloud::{AccessKey, CloudError, IamUser, IdentityApi, SecurityGroupApi, StorageApi};
#[cfg(any(test, feature = "test-utils"))]
pub use cloud::{CloudOp, MemoryCloud};
pub use error::{AppError, Result};
pub use manager::AppManager;
pub use repository::RepositoryClient;
