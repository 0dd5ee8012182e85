//! 設定からプロビジョナーを組み立てる

use fleetstack_config::{Config, ProvisionerKind};
use fleetstack_provision::{FakeProvisioner, Provisioner};
use fleetstack_provision_docker::{DockerProvisioner, DockerSettings};
use fleetstack_provision_juju::{JujuProvisioner, JujuSettings};
use fleetstack_provision_sakura::{SakuraProvisioner, SakuraSettings};
use std::sync::Arc;

pub fn docker_settings(config: &Config) -> DockerSettings {
    DockerSettings {
        image_prefix: config.docker.image_prefix.clone(),
        domain: config.docker.domain.clone(),
        network: config.docker.network.clone(),
        exec_timeout: config.exec_timeout(),
    }
}

pub fn juju_settings(config: &Config) -> JujuSettings {
    JujuSettings {
        binary: config.juju.binary.clone(),
        charms_path: config.juju.charms_path.clone(),
        exec_timeout: config.exec_timeout(),
        ..Default::default()
    }
}

pub fn sakura_settings(config: &Config) -> SakuraSettings {
    SakuraSettings {
        zone: config.sakura.zone.clone(),
        ssh_user: config.sakura.ssh_user.clone(),
        domain: config.sakura.domain.clone(),
        exec_timeout: config.exec_timeout(),
        ..Default::default()
    }
}

/// 設定された種別のプロビジョナーを生成
///
/// Docker はデーモンへの接続確認まで行う。
pub async fn build_provisioner(config: &Config) -> anyhow::Result<Arc<dyn Provisioner>> {
    let provisioner: Arc<dyn Provisioner> = match config.provisioner {
        ProvisionerKind::Docker => Arc::new(
            DockerProvisioner::connect(docker_settings(config))
                .await
                .map_err(|e| anyhow::anyhow!("Dockerに接続できません: {}", e))?,
        ),
        ProvisionerKind::Juju => Arc::new(JujuProvisioner::new(juju_settings(config))),
        ProvisionerKind::Sakura => Arc::new(SakuraProvisioner::new(sakura_settings(config))),
        ProvisionerKind::Fake => {
            Arc::new(FakeProvisioner::new().with_exec_timeout(config.exec_timeout()))
        }
    };
    tracing::info!(provisioner = provisioner.name(), "provisioner ready");
    Ok(provisioner)
}
