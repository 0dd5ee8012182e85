//! App / Unit から Docker API パラメータへの変換

#[allow(deprecated)]
use bollard::container::{Config, CreateContainerOptions};
use bollard::models::{ContainerState, ContainerStateStatusEnum, HostConfig};
use fleetstack_core::{App, UnitStatus};
use std::collections::HashMap;
use std::time::Duration;

pub const LABEL_APP: &str = "fleetstack.app";
pub const LABEL_UNIT: &str = "fleetstack.unit";
pub const LABEL_FRAMEWORK: &str = "fleetstack.framework";

/// Docker バックエンドの設定
#[derive(Debug, Clone)]
pub struct DockerSettings {
    /// イメージ名のプレフィックス（`<prefix><framework>`）
    pub image_prefix: String,
    /// アプリの公開ドメイン（`<app>.<domain>`）
    pub domain: String,
    /// ネットワーク名のプレフィックス（`<network>-<app>`）
    pub network: String,
    /// コマンド実行のタイムアウト
    pub exec_timeout: Duration,
}

impl Default for DockerSettings {
    fn default() -> Self {
        Self {
            image_prefix: "fleetstack/".to_string(),
            domain: "fleetstack.local".to_string(),
            network: "fleetstack".to_string(),
            exec_timeout: Duration::from_secs(10),
        }
    }
}

impl DockerSettings {
    /// アプリ専用ネットワーク名
    pub fn network_name(&self, app: &str) -> String {
        format!("{}-{}", self.network, app)
    }

    pub fn image(&self, framework: &str) -> String {
        format!("{}{}", self.image_prefix, framework)
    }
}

/// ユニット名（`<app>/<index>`）からコンテナ名を生成
pub fn container_name(unit_name: &str) -> String {
    unit_name.replace('/', "-")
}

/// ユニット1つ分のコンテナ設定を生成
#[allow(deprecated)]
pub fn unit_container_config(
    app: &App,
    unit_name: &str,
    settings: &DockerSettings,
) -> (Config<String>, CreateContainerOptions<String>) {
    // 環境変数（サービス由来のものも含めて全て渡す）
    let env: Vec<String> = app
        .env
        .values()
        .map(|v| format!("{}={}", v.name, v.value))
        .collect();

    let mut labels = HashMap::new();
    labels.insert(LABEL_APP.to_string(), app.name.clone());
    labels.insert(LABEL_UNIT.to_string(), unit_name.to_string());
    labels.insert(LABEL_FRAMEWORK.to_string(), app.framework.clone());

    let host_config = Some(HostConfig {
        network_mode: Some(settings.network_name(&app.name)),
        ..Default::default()
    });

    let config = Config {
        image: Some(settings.image(&app.framework)),
        env: Some(env),
        labels: Some(labels),
        host_config,
        ..Default::default()
    };

    let options = CreateContainerOptions {
        name: container_name(unit_name),
        platform: None,
    };

    (config, options)
}

/// コンテナの状態をユニットの状態に変換
pub fn unit_status(state: Option<&ContainerState>) -> UnitStatus {
    let Some(state) = state else {
        return UnitStatus::Pending;
    };
    if state.running.unwrap_or(false) {
        return UnitStatus::Started;
    }
    if state.restarting.unwrap_or(false) {
        return UnitStatus::Installing;
    }
    if state.dead.unwrap_or(false) || state.oom_killed.unwrap_or(false) {
        return UnitStatus::Error;
    }
    match state.status {
        Some(ContainerStateStatusEnum::CREATED) => UnitStatus::Creating,
        Some(ContainerStateStatusEnum::EXITED) if state.exit_code.unwrap_or(0) != 0 => {
            UnitStatus::Error
        }
        _ => UnitStatus::Down,
    }
}
