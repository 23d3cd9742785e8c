//! API models

mod deployment;
mod machine;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use deployment::*;
pub use machine::*;

/// Organization owning apps and their private network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: String,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// Application descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    pub id: String,
    pub name: String,
    pub organization: Organization,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub deployed: bool,
    #[serde(default)]
    pub hostname: Option<String>,
}

/// App creation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppInput {
    pub organization_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_region: Option<String>,
    pub runtime: String,
}

/// Secrets update request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetSecretsInput {
    pub secrets: BTreeMap<String, String>,
}

/// Release created by a configuration change
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Release {
    pub id: String,
    pub version: i64,
}

/// A single log line as returned by the logs endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppLogEntry {
    pub instance: String,
    pub level: String,
    pub message: String,
    pub region: String,
    pub timestamp: String,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// One page of app logs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppLogsPage {
    #[serde(default)]
    pub entries: Vec<AppLogEntry>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    /// Most specific human-readable message available
    pub fn describe(&self) -> &str {
        self.message.as_deref().unwrap_or(&self.error)
    }
}
