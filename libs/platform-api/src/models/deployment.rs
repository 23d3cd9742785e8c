//! Deployment and allocation models

use serde::{Deserialize, Serialize};

use crate::models::AppLogEntry;

/// An event recorded against an allocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationEvent {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// A running unit of a deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationStatus {
    pub id: String,
    pub version: i64,
    pub status: String,
    #[serde(default)]
    pub desired_status: String,
    pub healthy: bool,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default)]
    pub events: Vec<AllocationEvent>,
    #[serde(default)]
    pub recent_logs: Vec<AppLogEntry>,
}

/// Deployment summary with its allocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStatus {
    pub id: String,
    pub version: i64,
    pub status: String,
    #[serde(default)]
    pub description: String,
    pub in_progress: bool,
    #[serde(default)]
    pub desired_count: u32,
    #[serde(default)]
    pub placed_count: u32,
    #[serde(default)]
    pub healthy_count: u32,
    #[serde(default)]
    pub unhealthy_count: u32,
    #[serde(default)]
    pub allocations: Vec<AllocationStatus>,
}

/// Deployment status response for an app
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDeploymentStatus {
    #[serde(default)]
    pub deployment: Option<DeploymentStatus>,
}
