//! Machine models

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Machine lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineState {
    Created,
    Starting,
    Started,
    Stopping,
    Stopped,
    Replacing,
    Destroying,
    Destroyed,
    #[serde(other)]
    Unknown,
}

impl MachineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Created => "created",
            MachineState::Starting => "starting",
            MachineState::Started => "started",
            MachineState::Stopping => "stopping",
            MachineState::Stopped => "stopped",
            MachineState::Replacing => "replacing",
            MachineState::Destroying => "destroying",
            MachineState::Destroyed => "destroyed",
            MachineState::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for MachineState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "created" => Ok(MachineState::Created),
            "starting" => Ok(MachineState::Starting),
            "started" => Ok(MachineState::Started),
            "stopping" => Ok(MachineState::Stopping),
            "stopped" => Ok(MachineState::Stopped),
            "replacing" => Ok(MachineState::Replacing),
            "destroying" => Ok(MachineState::Destroying),
            "destroyed" => Ok(MachineState::Destroyed),
            other => Err(format!("unknown machine state: {}", other)),
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An address assigned to a machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIp {
    pub family: String,
    pub kind: String,
    pub ip: String,
}

/// A machine (VM) belonging to an app
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub state: MachineState,
    pub region: String,
    #[serde(default)]
    pub instance_id: Option<String>,
    #[serde(default)]
    pub ips: Vec<MachineIp>,
    pub config: MachineConfig,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Machine {
    /// First private address, the one reachable through the org tunnel
    pub fn private_ip(&self) -> Option<&str> {
        self.ips
            .iter()
            .find(|ip| ip.kind == "privatenet")
            .or_else(|| self.ips.first())
            .map(|ip| ip.ip.as_str())
    }
}

/// Restart policy kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicyKind {
    No,
    Always,
    OnFailure,
}

/// Restart policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartPolicy {
    pub policy: RestartPolicyKind,
}

/// Volume mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineMount {
    pub volume: String,
    pub path: String,
    pub size_gb: u32,
    #[serde(default)]
    pub encrypted: bool,
}

/// Typed machine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineConfig {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mounts: Vec<MachineMount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart: Option<RestartPolicy>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl MachineConfig {
    /// Create a config running the given image
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Default::default()
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = Some(size.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_mount(mut self, mount: MachineMount) -> Self {
        self.mounts.push(mount);
        self
    }

    pub fn with_restart(mut self, policy: RestartPolicyKind) -> Self {
        self.restart = Some(RestartPolicy { policy });
        self
    }

    /// Copy of this config pointing at another image
    pub fn with_image(&self, image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..self.clone()
        }
    }

    /// Check the config before it is sent to the API
    pub fn validate(&self) -> Result<(), String> {
        if self.image.trim().is_empty() {
            return Err("machine config has no image".to_string());
        }
        for mount in &self.mounts {
            if !mount.path.starts_with('/') {
                return Err(format!("mount path must be absolute: {}", mount.path));
            }
            if mount.size_gb == 0 {
                return Err(format!("mount {} has zero size", mount.volume));
            }
        }
        let mut paths: Vec<&str> = self.mounts.iter().map(|m| m.path.as_str()).collect();
        paths.sort_unstable();
        paths.dedup();
        if paths.len() != self.mounts.len() {
            return Err("duplicate mount paths".to_string());
        }
        Ok(())
    }
}

/// Machine launch request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchMachineInput {
    pub app_id: String,
    pub region: String,
    pub config: MachineConfig,
}
