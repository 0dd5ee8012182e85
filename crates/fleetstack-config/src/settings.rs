//! 設定ファイルのスキーマ

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 使用するプロビジョナー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProvisionerKind {
    #[default]
    Docker,
    Juju,
    Sakura,
    Fake,
}

impl std::fmt::Display for ProvisionerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisionerKind::Docker => write!(f, "docker"),
            ProvisionerKind::Juju => write!(f, "juju"),
            ProvisionerKind::Sakura => write!(f, "sakura"),
            ProvisionerKind::Fake => write!(f, "fake"),
        }
    }
}

/// FleetStack の設定
///
/// 全てのキーは省略可能で、省略時はデフォルト値が使われる。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// アプリに `FLEETSTACK_HOST` として渡す API ホスト
    pub host: String,
    /// サービスエンドポイントの選択に使う環境名
    pub environment: String,
    pub provisioner: ProvisionerKind,
    /// コマンド実行のタイムアウト (秒)
    pub exec_timeout_secs: u64,
    pub repository: RepositoryConfig,
    pub docker: DockerConfig,
    pub juju: JujuConfig,
    pub sakura: SakuraConfig,
    pub queue: QueueConfig,
    pub s3: S3Config,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            environment: "production".to_string(),
            provisioner: ProvisionerKind::default(),
            exec_timeout_secs: 10,
            repository: RepositoryConfig::default(),
            docker: DockerConfig::default(),
            juju: JujuConfig::default(),
            sakura: SakuraConfig::default(),
            queue: QueueConfig::default(),
            s3: S3Config::default(),
        }
    }
}

impl Config {
    pub fn exec_timeout(&self) -> Duration {
        Duration::from_secs(self.exec_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// リポジトリサーバーの URL
    pub server: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            server: "http://localhost:8000".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub image_prefix: String,
    pub domain: String,
    pub network: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            image_prefix: "fleetstack/".to_string(),
            domain: "fleetstack.local".to_string(),
            network: "fleetstack".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JujuConfig {
    pub binary: String,
    pub charms_path: String,
}

impl Default for JujuConfig {
    fn default() -> Self {
        Self {
            binary: "juju".to_string(),
            charms_path: "/etc/fleetstack/charms".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SakuraConfig {
    pub zone: String,
    pub ssh_user: String,
    pub domain: String,
}

impl Default for SakuraConfig {
    fn default() -> Self {
        Self {
            zone: "is1a".to_string(),
            ssh_user: "ubuntu".to_string(),
            domain: "fleetstack.cloud".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// 削除されなかったメッセージが再配信されるまでの秒数
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: 300,
        }
    }
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub endpoint: String,
    pub location_constraint: bool,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            location_constraint: true,
        }
    }
}
