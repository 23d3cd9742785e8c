//! Runtime options derived from settings

use std::time::Duration;

use crate::logs::LogOptions;
use crate::logstream::aggregator::AggregatorOptions;
use crate::monitor::deployment::MonitorOptions;
use crate::recipes::machines::WaitOptions;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::utils::BackoffOptions;

/// Everything commands need to know that is not a collaborator
#[derive(Debug, Clone)]
pub struct CliOptions {
    /// Diagnostic logging
    pub logging: LogOptions,

    /// Control-plane base URL
    pub api_url: String,

    /// Local tunnel agent URL
    pub agent_url: String,

    /// Bounded wait for tunnel establishment
    pub tunnel_timeout: Duration,

    /// Polling log stream backoff
    pub log_backoff: BackoffOptions,

    /// Log source merging
    pub aggregator: AggregatorOptions,

    /// Deployment monitor polling
    pub monitor: MonitorOptions,

    /// Machine state polling for recipes
    pub machine_wait: WaitOptions,
}

impl Default for CliOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), None)
    }
}

impl CliOptions {
    /// Build options from settings; file logging is enabled only when the
    /// settings ask for it and a layout is given
    pub fn from_settings(settings: &Settings, layout: Option<&StorageLayout>) -> Self {
        let log_dir = match layout {
            Some(layout) if settings.log_to_file => Some(layout.logs_dir()),
            _ => None,
        };

        Self {
            logging: LogOptions {
                log_level: settings.log_level.clone(),
                stderr: true,
                log_dir,
                format: settings.log_format,
            },
            api_url: settings.api.base_url.clone(),
            agent_url: settings.agent.base_url.clone(),
            tunnel_timeout: settings.agent.tunnel_timeout(),
            log_backoff: BackoffOptions {
                min_delay: Duration::from_millis(settings.logs.min_backoff_ms),
                max_delay: Duration::from_millis(settings.logs.max_backoff_ms),
                ..BackoffOptions::default()
            },
            aggregator: AggregatorOptions {
                settle_delay: Duration::from_millis(settings.logs.settle_delay_ms),
                ..AggregatorOptions::default()
            },
            monitor: MonitorOptions {
                interval: Duration::from_millis(settings.monitor.poll_interval_ms),
                ..MonitorOptions::default()
            },
            machine_wait: WaitOptions {
                interval: Duration::from_millis(settings.machines.state_poll_interval_ms),
                timeout: Duration::from_secs(settings.machines.state_timeout_secs),
            },
        }
    }
}
