//! Cloud identity, storage and network collaborators
//!
//! Each app gets its own cloud user, access key, bucket and user policy,
//! and its security group is opened for ssh and http. The APIs are consumed
//! through [`IdentityApi`], [`StorageApi`] and [`SecurityGroupApi`] so the
//! provider can be swapped; [`MemoryCloud`] implements all of them in memory.

use async_trait::async_trait;
use fleetstack_core::ErrorKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    #[error("Cloud resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Cloud resource not found: {0}")]
    NotFound(String),

    #[error("Cloud API error: {0}")]
    Api(String),
}

impl CloudError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CloudError::AlreadyExists(_) => ErrorKind::Conflict,
            CloudError::NotFound(_) => ErrorKind::NotFound,
            CloudError::Api(_) => ErrorKind::Remote,
        }
    }
}

/// クラウド上のユーザー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IamUser {
    pub id: String,
    pub name: String,
}

/// ユーザーに発行されたアクセスキー
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessKey {
    pub id: String,
    pub secret: String,
    pub user_name: String,
}

#[async_trait]
pub trait IdentityApi: Send + Sync {
    async fn create_user(&self, name: &str) -> Result<IamUser, CloudError>;
    async fn delete_user(&self, name: &str) -> Result<(), CloudError>;
    async fn create_access_key(&self, user: &str) -> Result<AccessKey, CloudError>;
    async fn delete_access_key(&self, key_id: &str, user: &str) -> Result<(), CloudError>;
    async fn put_user_policy(&self, user: &str, policy: &str, document: &str) -> Result<(), CloudError>;
    async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<(), CloudError>;
}

#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_bucket(&self, name: &str) -> Result<(), CloudError>;
    async fn delete_bucket(&self, name: &str) -> Result<(), CloudError>;
}

#[async_trait]
pub trait SecurityGroupApi: Send + Sync {
    /// Allow inbound `protocol`/`port` from anywhere on `group`. A rule the
    /// group already has is `AlreadyExists`.
    async fn authorize_ingress(
        &self,
        group: &str,
        protocol: &str,
        port: u16,
    ) -> Result<(), CloudError>;
}

#[cfg(any(test, feature = "test-utils"))]
pub use memory::{CloudOp, MemoryCloud};

#[cfg(any(test, feature = "test-utils"))]
mod memory {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet, HashSet};
    use tokio::sync::Mutex;

    /// Cloud operations, used to target injected failures
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum CloudOp {
        CreateUser,
        CreateAccessKey,
        PutUserPolicy,
        CreateBucket,
        AuthorizeIngress,
    }

    #[derive(Debug, Default)]
    struct State {
        next_id: u64,
        users: BTreeMap<String, IamUser>,
        keys: BTreeMap<String, AccessKey>,
        policies: BTreeMap<(String, String), String>,
        buckets: BTreeSet<String>,
        ingress: BTreeSet<(String, String, u16)>,
        failures: HashSet<CloudOp>,
    }

    impl State {
        fn fail(&mut self, op: CloudOp) -> Result<(), CloudError> {
            if self.failures.remove(&op) {
                return Err(CloudError::Api(format!("injected failure: {:?}", op)));
            }
            Ok(())
        }

        fn next_id(&mut self, prefix: &str) -> String {
            self.next_id += 1;
            format!("{}{:05}", prefix, self.next_id)
        }
    }

    /// In-memory identity and storage provider
    #[derive(Debug, Default)]
    pub struct MemoryCloud {
        state: Mutex<State>,
    }

    impl MemoryCloud {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next call of `op` fail
        pub async fn prepare_failure(&self, op: CloudOp) {
            self.state.lock().await.failures.insert(op);
        }

        pub async fn users(&self) -> Vec<String> {
            self.state.lock().await.users.keys().cloned().collect()
        }

        pub async fn access_keys(&self, user: &str) -> Vec<AccessKey> {
            self.state
                .lock()
                .await
                .keys
                .values()
                .filter(|k| k.user_name == user)
                .cloned()
                .collect()
        }

        pub async fn policy(&self, user: &str, policy: &str) -> Option<String> {
            self.state
                .lock()
                .await
                .policies
                .get(&(user.to_string(), policy.to_string()))
                .cloned()
        }

        pub async fn buckets(&self) -> Vec<String> {
            self.state.lock().await.buckets.iter().cloned().collect()
        }

        /// `(protocol, port)` rules of one group
        pub async fn ingress_rules(&self, group: &str) -> Vec<(String, u16)> {
            self.state
                .lock()
                .await
                .ingress
                .iter()
                .filter(|(g, _, _)| g == group)
                .map(|(_, protocol, port)| (protocol.clone(), *port))
                .collect()
        }
    }

    #[async_trait]
    impl IdentityApi for MemoryCloud {
        async fn create_user(&self, name: &str) -> Result<IamUser, CloudError> {
            let mut state = self.state.lock().await;
            state.fail(CloudOp::CreateUser)?;
            if state.users.contains_key(name) {
                return Err(CloudError::AlreadyExists(name.to_string()));
            }
            let user = IamUser {
                id: state.next_id("AIDA"),
                name: name.to_string(),
            };
            state.users.insert(name.to_string(), user.clone());
            Ok(user)
        }

        async fn delete_user(&self, name: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state
                .users
                .remove(name)
                .map(|_| ())
                .ok_or_else(|| CloudError::NotFound(name.to_string()))
        }

        async fn create_access_key(&self, user: &str) -> Result<AccessKey, CloudError> {
            let mut state = self.state.lock().await;
            state.fail(CloudOp::CreateAccessKey)?;
            if !state.users.contains_key(user) {
                return Err(CloudError::NotFound(user.to_string()));
            }
            let key = AccessKey {
                id: state.next_id("AKIA"),
                secret: state.next_id("secret"),
                user_name: user.to_string(),
            };
            state.keys.insert(key.id.clone(), key.clone());
            Ok(key)
        }

        async fn delete_access_key(&self, key_id: &str, _user: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state
                .keys
                .remove(key_id)
                .map(|_| ())
                .ok_or_else(|| CloudError::NotFound(key_id.to_string()))
        }

        async fn put_user_policy(&self, user: &str, policy: &str, document: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state.fail(CloudOp::PutUserPolicy)?;
            state
                .policies
                .insert((user.to_string(), policy.to_string()), document.to_string());
            Ok(())
        }

        async fn delete_user_policy(&self, user: &str, policy: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state
                .policies
                .remove(&(user.to_string(), policy.to_string()))
                .map(|_| ())
                .ok_or_else(|| CloudError::NotFound(policy.to_string()))
        }
    }

    #[async_trait]
    impl StorageApi for MemoryCloud {
        async fn create_bucket(&self, name: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state.fail(CloudOp::CreateBucket)?;
            if !state.buckets.insert(name.to_string()) {
                return Err(CloudError::AlreadyExists(name.to_string()));
            }
            Ok(())
        }

        async fn delete_bucket(&self, name: &str) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            if state.buckets.remove(name) {
                Ok(())
            } else {
                Err(CloudError::NotFound(name.to_string()))
            }
        }
    }

    #[async_trait]
    impl SecurityGroupApi for MemoryCloud {
        async fn authorize_ingress(
            &self,
            group: &str,
            protocol: &str,
            port: u16,
        ) -> Result<(), CloudError> {
            let mut state = self.state.lock().await;
            state.fail(CloudOp::AuthorizeIngress)?;
            if !state
                .ingress
                .insert((group.to_string(), protocol.to_string(), port))
            {
                return Err(CloudError::AlreadyExists(format!("{group} {protocol}/{port}")));
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cloud_user_lifecycle() {
        let cloud = MemoryCloud::new();

        let user = cloud.create_user("trapped").await.unwrap();
        let key = cloud.create_access_key(&user.name).await.unwrap();

        assert_eq!(key.user_name, "trapped");
        assert!(!key.secret.is_empty());
        assert_eq!(
            cloud.create_user("trapped").await,
            Err(CloudError::AlreadyExists("trapped".to_string()))
        );

        cloud.delete_access_key(&key.id, &user.name).await.unwrap();
        cloud.delete_user(&user.name).await.unwrap();
        assert!(cloud.users().await.is_empty());
        assert!(cloud.access_keys("trapped").await.is_empty());
    }

    #[tokio::test]
    async fn test_prepared_failure_fires_once() {
        let cloud = MemoryCloud::new();
        cloud.prepare_failure(CloudOp::CreateBucket).await;

        let err = cloud.create_bucket("leper").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Remote);

        cloud.create_bucket("leper").await.unwrap();
        assert_eq!(cloud.buckets().await, vec!["leper"]);
    }

    #[tokio::test]
    async fn test_duplicate_ingress_rule_already_exists() {
        let cloud = MemoryCloud::new();

        cloud.authorize_ingress("fleetstack-quick", "tcp", 22).await.unwrap();
        let err = cloud
            .authorize_ingress("fleetstack-quick", "tcp", 22)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(cloud.ingress_rules("fleetstack-quick").await, vec![("tcp".to_string(), 22)]);
        assert!(cloud.ingress_rules("fleetstack-other").await.is_empty());
    }
}
