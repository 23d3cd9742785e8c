//! Settings file management

use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::errors::CliError;
use crate::logs::{LogFormat, LogLevel};
use crate::storage::layout::StorageLayout;

/// Environment variable overriding the access token
pub const ACCESS_TOKEN_ENV_VAR: &str = "DECKHAND_ACCESS_TOKEN";

/// Environment variable overriding the API base URL
pub const API_URL_ENV_VAR: &str = "DECKHAND_API_URL";

/// CLI settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Diagnostic log format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Also write diagnostic logs under the storage layout
    #[serde(default)]
    pub log_to_file: bool,

    /// Control-plane API configuration
    #[serde(default)]
    pub api: ApiSettings,

    /// Tunnel agent configuration
    #[serde(default)]
    pub agent: AgentSettings,

    /// Log streaming configuration
    #[serde(default)]
    pub logs: LogStreamSettings,

    /// Deployment monitor configuration
    #[serde(default)]
    pub monitor: MonitorSettings,

    /// Machine state polling configuration
    #[serde(default)]
    pub machines: MachineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            log_format: LogFormat::default(),
            log_to_file: false,
            api: ApiSettings::default(),
            agent: AgentSettings::default(),
            logs: LogStreamSettings::default(),
            monitor: MonitorSettings::default(),
            machines: MachineSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from the layout, falling back to defaults when absent,
    /// then apply environment overrides
    pub async fn load(layout: &StorageLayout) -> Result<Self, CliError> {
        let file = layout.settings_file();
        let mut settings = match file.read::<Settings>().await? {
            Some(settings) => settings,
            None => {
                debug!("No settings file at {}, using defaults", file.path().display());
                Settings::default()
            }
        };

        settings.apply_env();
        Ok(settings)
    }

    /// Persist settings to the layout
    pub async fn save(&self, layout: &StorageLayout) -> Result<(), CliError> {
        layout.settings_file().write(self).await
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV_VAR) {
            if !token.is_empty() {
                self.api.access_token = Some(SecretString::from(token));
            }
        }
        if let Ok(url) = std::env::var(API_URL_ENV_VAR) {
            if !url.is_empty() {
                self.api.base_url = url;
            }
        }
    }
}

/// Control-plane API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL for the API
    #[serde(default = "default_api_url")]
    pub base_url: String,

    /// Access token; never written back to disk
    #[serde(default, skip_serializing, deserialize_with = "deserialize_secret")]
    pub access_token: Option<SecretString>,

    /// Organization slug used when a command does not name one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_org: Option<String>,
}

fn default_api_url() -> String {
    "https://api.machines.dev/v1".to_string()
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()).map(SecretString::from))
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_url(),
            access_token: None,
            default_org: None,
        }
    }
}

/// Tunnel agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSettings {
    /// Local agent endpoint
    #[serde(default = "default_agent_url")]
    pub base_url: String,

    /// Bounded wait for tunnel establishment, in seconds
    #[serde(default = "default_tunnel_timeout")]
    pub tunnel_timeout_secs: u64,
}

fn default_agent_url() -> String {
    "http://127.0.0.1:17771".to_string()
}

fn default_tunnel_timeout() -> u64 {
    5
}

impl AgentSettings {
    pub fn tunnel_timeout(&self) -> Duration {
        Duration::from_secs(self.tunnel_timeout_secs)
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_url: default_agent_url(),
            tunnel_timeout_secs: default_tunnel_timeout(),
        }
    }
}

/// Log streaming settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogStreamSettings {
    #[serde(default = "default_min_backoff")]
    pub min_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,

    /// Delay between a live subscription succeeding and polling being stopped
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

fn default_min_backoff() -> u64 {
    250
}

fn default_max_backoff() -> u64 {
    5_000
}

fn default_settle_delay() -> u64 {
    2_000
}

impl Default for LogStreamSettings {
    fn default() -> Self {
        Self {
            min_backoff_ms: default_min_backoff(),
            max_backoff_ms: default_max_backoff(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

/// Deployment monitor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSettings {
    #[serde(default = "default_monitor_interval")]
    pub poll_interval_ms: u64,
}

fn default_monitor_interval() -> u64 {
    1_000
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_monitor_interval(),
        }
    }
}

/// Machine state polling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineSettings {
    #[serde(default = "default_state_interval")]
    pub state_poll_interval_ms: u64,

    #[serde(default = "default_state_timeout")]
    pub state_timeout_secs: u64,
}

fn default_state_interval() -> u64 {
    1_000
}

fn default_state_timeout() -> u64 {
    300
}

impl Default for MachineSettings {
    fn default() -> Self {
        Self {
            state_poll_interval_ms: default_state_interval(),
            state_timeout_secs: default_state_timeout(),
        }
    }
}
