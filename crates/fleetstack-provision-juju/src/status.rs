//! `juju status --format json` output

use fleetstack_core::{Unit, UnitStatus};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Top-level status document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JujuStatus {
    #[serde(default)]
    pub machines: BTreeMap<String, MachineStatus>,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceStatus>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct MachineStatus {
    #[serde(default)]
    pub dns_name: Option<String>,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub agent_state: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStatus {
    #[serde(default)]
    pub charm: Option<String>,
    #[serde(default)]
    pub units: BTreeMap<String, UnitInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct UnitInfo {
    #[serde(default)]
    pub agent_state: Option<String>,
    #[serde(default)]
    pub machine: Option<String>,
    #[serde(default)]
    pub public_address: Option<String>,
}

impl JujuStatus {
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(json)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Units of one service, ordered by unit index
    pub fn units_of(&self, service: &str) -> Vec<Unit> {
        let Some(status) = self.services.get(service) else {
            return Vec::new();
        };
        let mut units: Vec<Unit> = status
            .units
            .iter()
            .map(|(name, info)| self.to_unit(service, status, name, info))
            .collect();
        units.sort_by_key(|u| u.index().unwrap_or(0));
        units
    }

    /// Units of every service
    pub fn all_units(&self) -> Vec<Unit> {
        self.services
            .keys()
            .flat_map(|service| self.units_of(service))
            .collect()
    }

    fn to_unit(&self, service: &str, status: &ServiceStatus, name: &str, info: &UnitInfo) -> Unit {
        let machine_id = info.machine.clone().unwrap_or_default();
        let machine = self.machines.get(&machine_id);
        let ip = info
            .public_address
            .clone()
            .or_else(|| machine.and_then(|m| m.dns_name.clone()))
            .unwrap_or_default();

        Unit {
            name: name.to_string(),
            app_name: service.to_string(),
            unit_type: status
                .charm
                .as_deref()
                .map(charm_framework)
                .unwrap_or_default(),
            machine: machine_id.parse().unwrap_or(0),
            instance_id: machine
                .and_then(|m| m.instance_id.clone())
                .unwrap_or_default(),
            ip,
            state: unit_status(
                info.agent_state.as_deref(),
                machine.and_then(|m| m.agent_state.as_deref()),
            ),
        }
    }
}

/// `local:precise/python-12` -> `python`
fn charm_framework(charm: &str) -> String {
    let name = charm.rsplit('/').next().unwrap_or(charm);
    let name = name.rsplit_once(':').map_or(name, |(_, n)| n);
    match name.rsplit_once('-') {
        Some((base, rev)) if rev.chars().all(|c| c.is_ascii_digit()) => base.to_string(),
        _ => name.to_string(),
    }
}

/// Map unit and machine agent states to a unit status
pub fn unit_status(unit_state: Option<&str>, machine_state: Option<&str>) -> UnitStatus {
    match unit_state.unwrap_or("pending") {
        s if s.contains("error") => UnitStatus::Error,
        "started" => UnitStatus::Started,
        "installed" => UnitStatus::Installing,
        "down" | "stopped" => UnitStatus::Down,
        "pending" => match machine_state {
            Some("running") | Some("started") => UnitStatus::Installing,
            Some("pending") => UnitStatus::Creating,
            Some(s) if s.contains("error") => UnitStatus::Error,
            _ => UnitStatus::Pending,
        },
        _ => UnitStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATUS: &str = r#"{
        "machines": {
            "0": {"dns-name": "192.168.0.10", "instance-id": "i-00000438", "agent-state": "running"},
            "1": {"dns-name": "192.168.0.11", "instance-id": "i-00000439", "agent-state": "running"},
            "2": {"instance-id": "pending", "agent-state": "pending"}
        },
        "services": {
            "as_i_rise": {
                "charm": "local:precise/python-10",
                "units": {
                    "as_i_rise/1": {"agent-state": "install-error", "machine": "2"},
                    "as_i_rise/0": {"agent-state": "started", "machine": "1", "public-address": "server-1081.novalocal"}
                }
            },
            "the_infanta": {
                "charm": "local:precise/gunicorn-3",
                "units": {
                    "the_infanta/0": {"agent-state": "pending", "machine": "0"}
                }
            }
        }
    }"#;

    #[test]
    fn test_parse_units_of_service() {
        let status = JujuStatus::parse(STATUS).unwrap();
        let units = status.units_of("as_i_rise");

        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "as_i_rise/0");
        assert_eq!(units[0].unit_type, "python");
        assert_eq!(units[0].machine, 1);
        assert_eq!(units[0].instance_id, "i-00000439");
        assert_eq!(units[0].ip, "server-1081.novalocal");
        assert_eq!(units[0].state, UnitStatus::Started);
        assert_eq!(units[1].state, UnitStatus::Error);
        assert_eq!(units[1].ip, "");
    }

    #[test]
    fn test_machine_dns_name_is_fallback_address() {
        let status = JujuStatus::parse(STATUS).unwrap();
        let units = status.units_of("the_infanta");

        assert_eq!(units[0].ip, "192.168.0.10");
        assert_eq!(units[0].state, UnitStatus::Installing);
        assert_eq!(units[0].unit_type, "gunicorn");
    }

    #[test]
    fn test_all_units_and_missing_service() {
        let status = JujuStatus::parse(STATUS).unwrap();
        assert_eq!(status.all_units().len(), 3);
        assert!(status.units_of("nobody").is_empty());
        assert!(!status.has_service("nobody"));
    }

    #[test]
    fn test_empty_output() {
        let status = JujuStatus::parse("  ").unwrap();
        assert!(status.services.is_empty());
    }

    #[test]
    fn test_unit_status_table() {
        assert_eq!(unit_status(Some("pending"), Some("pending")), UnitStatus::Creating);
        assert_eq!(unit_status(Some("pending"), None), UnitStatus::Pending);
        assert_eq!(unit_status(Some("installed"), Some("running")), UnitStatus::Installing);
        assert_eq!(unit_status(Some("down"), Some("running")), UnitStatus::Down);
        assert_eq!(unit_status(Some("start-error"), Some("running")), UnitStatus::Error);
        assert_eq!(unit_status(Some("pending"), Some("start-error")), UnitStatus::Error);
    }

    #[test]
    fn test_charm_framework() {
        assert_eq!(charm_framework("local:precise/python-10"), "python");
        assert_eq!(charm_framework("cs:static"), "static");
        assert_eq!(charm_framework("local:precise/node-js-2"), "node-js");
    }
}
