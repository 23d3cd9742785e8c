//! Deployment status monitor
//!
//! Follows one deployment from first observation to a terminal state:
//! `started → updated* → succeeded | failed`. Callers loop over
//! [`DeploymentMonitor::run`] to keep watching later deployments.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use platform_api::{AllocationStatus, DeploymentStatus};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::CliError;
use crate::http::api::ControlPlane;

/// Recent log lines fetched per failed allocation
pub const DIAGNOSTIC_LOG_LIMIT: u32 = 20;

/// Lifecycle callbacks
pub trait DeploymentObserver: Send + Sync {
    /// A deployment version was seen for the first time; `index` counts
    /// versions started over the monitor's lifetime
    fn started(&self, index: usize, status: &DeploymentStatus) -> Result<(), CliError>;

    /// Allocations whose health or status changed since the last poll
    fn updated(&self, status: &DeploymentStatus, changed: &[AllocationStatus])
        -> Result<(), CliError>;

    fn failed(&self, status: &DeploymentStatus, failed: &[AllocationStatus])
        -> Result<(), CliError>;

    /// Detail for each failed allocation, in the order they were reported
    fn diagnostics(
        &self,
        status: &DeploymentStatus,
        details: Vec<Result<AllocationStatus, CliError>>,
    ) -> Result<(), CliError>;

    fn succeeded(&self, status: &DeploymentStatus) -> Result<(), CliError>;
}

#[derive(Debug, Clone)]
pub struct MonitorOptions {
    pub interval: Duration,
    pub log_limit: u32,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            log_limit: DIAGNOSTIC_LOG_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorOutcome {
    pub version: i64,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AllocSnapshot {
    status: String,
    healthy: bool,
}

impl From<&AllocationStatus> for AllocSnapshot {
    fn from(alloc: &AllocationStatus) -> Self {
        Self {
            status: alloc.status.clone(),
            healthy: alloc.healthy,
        }
    }
}

/// True when every allocation of the deployment's own version is healthy
///
/// A deployment with no allocations at its version counts as healthy.
pub fn is_successful(status: &DeploymentStatus) -> bool {
    failed_allocations(status).is_empty()
}

/// Unhealthy allocations belonging to the deployment's version
pub fn failed_allocations(status: &DeploymentStatus) -> Vec<AllocationStatus> {
    status
        .allocations
        .iter()
        .filter(|a| a.version == status.version && !a.healthy)
        .cloned()
        .collect()
}

pub struct DeploymentMonitor {
    client: Arc<dyn ControlPlane>,
    app_name: String,
    options: MonitorOptions,
    /// Last version that reached a terminal state, or that was already
    /// finished when the monitor first looked
    finished: Option<i64>,
    primed: bool,
    /// Deployments started over the monitor's lifetime
    started: usize,
}

impl DeploymentMonitor {
    pub fn new(client: Arc<dyn ControlPlane>, app_name: impl Into<String>, options: MonitorOptions) -> Self {
        Self {
            client,
            app_name: app_name.into(),
            options,
            finished: None,
            primed: false,
            started: 0,
        }
    }

    /// Watch until one deployment finishes
    pub async fn run(
        &mut self,
        observer: &dyn DeploymentObserver,
        cancel: &CancellationToken,
    ) -> Result<MonitorOutcome, CliError> {
        let mut tracking: Option<i64> = None;
        let mut snapshot: HashMap<String, AllocSnapshot> = HashMap::new();

        loop {
            let polled = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CliError::Cancelled),
                polled = self.client.get_deployment_status(&self.app_name, true) => polled?,
            };

            let first_poll = !self.primed;
            self.primed = true;

            if let Some(status) = polled.deployment {
                if first_poll && !status.in_progress {
                    debug!("v{} already finished, waiting for a new deployment", status.version);
                    self.finished = Some(status.version);
                }

                if self.finished != Some(status.version) {
                    if tracking != Some(status.version) {
                        tracking = Some(status.version);
                        snapshot = status
                            .allocations
                            .iter()
                            .map(|a| (a.id.clone(), AllocSnapshot::from(a)))
                            .collect();
                        observer.started(self.started, &status)?;
                        self.started += 1;
                    } else {
                        let changed: Vec<AllocationStatus> = status
                            .allocations
                            .iter()
                            .filter(|a| snapshot.get(&a.id) != Some(&AllocSnapshot::from(*a)))
                            .cloned()
                            .collect();
                        if !changed.is_empty() {
                            for alloc in &changed {
                                snapshot.insert(alloc.id.clone(), AllocSnapshot::from(alloc));
                            }
                            observer.updated(&status, &changed)?;
                        }
                    }

                    if !status.in_progress {
                        self.finished = Some(status.version);
                        return self.finish(observer, &status).await;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(CliError::Cancelled),
                _ = tokio::time::sleep(self.options.interval) => {}
            }
        }
    }

    async fn finish(
        &self,
        observer: &dyn DeploymentObserver,
        status: &DeploymentStatus,
    ) -> Result<MonitorOutcome, CliError> {
        let failed = failed_allocations(status);

        if failed.is_empty() {
            info!("v{} of {} succeeded", status.version, self.app_name);
            observer.succeeded(status)?;
            return Ok(MonitorOutcome {
                version: status.version,
                success: true,
            });
        }

        info!(
            "v{} of {} failed with {} unhealthy allocation(s)",
            status.version,
            self.app_name,
            failed.len()
        );
        observer.failed(status, &failed)?;

        let details = self.fetch_diagnostics(&failed).await;
        observer.diagnostics(status, details)?;

        Ok(MonitorOutcome {
            version: status.version,
            success: false,
        })
    }

    /// Fetch every failed allocation concurrently; one failure does not stop
    /// the others
    async fn fetch_diagnostics(
        &self,
        failed: &[AllocationStatus],
    ) -> Vec<Result<AllocationStatus, CliError>> {
        let mut tasks = JoinSet::new();
        for (i, alloc) in failed.iter().enumerate() {
            let client = self.client.clone();
            let app_name = self.app_name.clone();
            let alloc_id = alloc.id.clone();
            let log_limit = self.options.log_limit;
            tasks.spawn(async move {
                let result = client
                    .get_allocation_status(&app_name, &alloc_id, log_limit)
                    .await;
                (i, result)
            });
        }

        let mut slots: Vec<Option<Result<AllocationStatus, CliError>>> =
            failed.iter().map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, result)) => slots[i] = Some(result),
                Err(e) => debug!("Diagnostics task failed: {}", e),
            }
        }

        slots
            .into_iter()
            .zip(failed)
            .map(|(slot, alloc)| {
                slot.unwrap_or_else(|| {
                    Err(CliError::Internal(format!(
                        "diagnostics for {} were not collected",
                        alloc.id
                    )))
                })
            })
            .collect()
    }
}
