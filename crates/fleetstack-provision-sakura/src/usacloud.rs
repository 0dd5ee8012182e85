//! usacloud CLI wrapper
//!
//! Wraps the usacloud CLI commands the provisioner needs.

use fleetstack_core::UnitStatus;
use fleetstack_provision::{CommandRunner, Result};
use serde::{Deserialize, Serialize};

pub const TAG_APP: &str = "fleetstack.app=";
pub const TAG_UNIT: &str = "fleetstack.unit=";
pub const TAG_FRAMEWORK: &str = "fleetstack.framework=";

/// usacloud CLI wrapper
pub struct Usacloud {
    runner: CommandRunner,
}

impl Usacloud {
    pub fn new(zone: &str) -> Self {
        Self::with_runner(CommandRunner::new("usacloud").with_base_args(["--zone", zone]))
    }

    /// Use a preconfigured runner. Its base arguments must select the zone.
    pub fn with_runner(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub fn with_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.runner = self.runner.with_timeout(timeout);
        self
    }

    /// List all servers
    pub async fn list_servers(&self) -> Result<Vec<ServerInfo>> {
        let output = self
            .runner
            .run(&["server", "list", "--output-type", "json"])
            .await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }

        let servers: Vec<ServerInfo> = serde_json::from_str(&output)?;
        Ok(servers)
    }

    /// Create a server
    pub async fn create_server(&self, config: &CreateServerConfig) -> Result<ServerInfo> {
        // Store string conversions to extend their lifetime
        let core_str = config.core.to_string();
        let memory_str = config.memory.to_string();
        let tags = config.tags.join(",");

        let mut args = vec![
            "server",
            "create",
            "--name",
            config.name.as_str(),
            "--core",
            core_str.as_str(),
            "--memory",
            memory_str.as_str(),
            "--tags",
            tags.as_str(),
            "--output-type",
            "json",
            "--yes",
        ];

        if let Some(ref os) = config.os_type {
            args.push("--os-type");
            args.push(os.as_str());
        }

        for id in &config.ssh_key_ids {
            args.push("--disk-edit-ssh-key-id");
            args.push(id.as_str());
        }

        let output = self.runner.run(&args).await?;
        let server: ServerInfo = serde_json::from_str(&output)?;
        Ok(server)
    }

    /// Delete a server together with its disks
    pub async fn delete_server(&self, id: &str) -> Result<()> {
        self.runner
            .run(&["server", "delete", id, "--with-disks", "--force", "--yes"])
            .await?;
        Ok(())
    }

    /// Hard reset a server
    pub async fn reset_server(&self, id: &str) -> Result<()> {
        self.runner.run(&["server", "reset", id, "--yes"]).await?;
        Ok(())
    }

    pub async fn list_switches(&self) -> Result<Vec<SwitchInfo>> {
        let output = self
            .runner
            .run(&["switch", "list", "--output-type", "json"])
            .await?;

        if output.trim().is_empty() || output.trim() == "[]" {
            return Ok(Vec::new());
        }

        let switches: Vec<SwitchInfo> = serde_json::from_str(&output)?;
        Ok(switches)
    }

    pub async fn create_switch(&self, name: &str, tag: &str) -> Result<SwitchInfo> {
        let output = self
            .runner
            .run(&[
                "switch",
                "create",
                "--name",
                name,
                "--tags",
                tag,
                "--output-type",
                "json",
                "--yes",
            ])
            .await?;
        let switch: SwitchInfo = serde_json::from_str(&output)?;
        Ok(switch)
    }

    pub async fn delete_switch(&self, id: &str) -> Result<()> {
        self.runner.run(&["switch", "delete", id, "--yes"]).await?;
        Ok(())
    }
}

/// Server information from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "InstanceStatus")]
    pub instance_status: Option<String>,

    #[serde(rename = "Availability")]
    pub availability: Option<String>,

    #[serde(rename = "Interfaces")]
    pub interfaces: Option<Vec<InterfaceInfo>>,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

impl ServerInfo {
    /// Get the first IP address
    pub fn ip_address(&self) -> Option<String> {
        self.interfaces
            .as_ref()?
            .iter()
            .find_map(|i| i.ip_address.clone())
    }

    /// Value of the first tag starting with `prefix`
    pub fn tag(&self, prefix: &str) -> Option<&str> {
        self.tags.iter().find_map(|t| t.strip_prefix(prefix))
    }

    pub fn app(&self) -> Option<&str> {
        self.tag(TAG_APP)
    }

    pub fn unit(&self) -> Option<&str> {
        self.tag(TAG_UNIT)
    }

    pub fn unit_status(&self) -> UnitStatus {
        if self.availability.as_deref() == Some("failed") {
            return UnitStatus::Error;
        }
        match self.instance_status.as_deref() {
            Some("up") => UnitStatus::Started,
            Some("cleaning") => UnitStatus::Installing,
            Some("down") => UnitStatus::Down,
            _ if self.availability.as_deref() == Some("migrating") => UnitStatus::Creating,
            _ => UnitStatus::Pending,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceInfo {
    #[serde(rename = "IPAddress")]
    pub ip_address: Option<String>,
}

/// Switch information from usacloud
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchInfo {
    #[serde(rename = "ID")]
    pub id: String,

    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "Tags", default)]
    pub tags: Vec<String>,
}

/// Configuration for creating a server
#[derive(Debug, Clone)]
pub struct CreateServerConfig {
    pub name: String,
    pub core: i32,
    pub memory: i32,
    pub os_type: Option<String>,
    pub ssh_key_ids: Vec<String>,
    pub tags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const SERVERS: &str = r#"[
        {
            "ID": "113100000001",
            "Name": "painkiller-0",
            "InstanceStatus": "up",
            "Availability": "available",
            "Interfaces": [{"IPAddress": "192.168.1.1"}],
            "Tags": ["fleetstack.app=painkiller", "fleetstack.unit=painkiller/0"]
        },
        {
            "ID": "113100000002",
            "Name": "legacy",
            "InstanceStatus": "down",
            "Interfaces": []
        }
    ]"#;

    #[test]
    fn test_server_info_parse_and_tags() {
        let servers: Vec<ServerInfo> = serde_json::from_str(SERVERS).unwrap();

        assert_eq!(servers[0].ip_address(), Some("192.168.1.1".to_string()));
        assert_eq!(servers[0].app(), Some("painkiller"));
        assert_eq!(servers[0].unit(), Some("painkiller/0"));
        assert_eq!(servers[0].unit_status(), UnitStatus::Started);

        assert!(servers[1].tags.is_empty());
        assert_eq!(servers[1].app(), None);
        assert_eq!(servers[1].ip_address(), None);
        assert_eq!(servers[1].unit_status(), UnitStatus::Down);
    }

    #[test]
    fn test_unit_status_from_availability() {
        let mut server: ServerInfo = serde_json::from_str(
            r#"{"ID": "1", "Name": "x", "Availability": "migrating"}"#,
        )
        .unwrap();
        assert_eq!(server.unit_status(), UnitStatus::Creating);

        server.availability = Some("failed".to_string());
        assert_eq!(server.unit_status(), UnitStatus::Error);

        server.availability = None;
        assert_eq!(server.unit_status(), UnitStatus::Pending);
    }
}
