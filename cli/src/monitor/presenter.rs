//! Terminal output for the deployment monitor

use std::io::{self, Write};
use std::sync::Mutex;

use colored::Colorize;
use platform_api::{AllocationStatus, DeploymentStatus};

use crate::errors::CliError;
use crate::logstream::presenter::LogPresenter;
use crate::logstream::LogEntry;
use crate::monitor::deployment::DeploymentObserver;

pub fn format_deployment_summary(status: &DeploymentStatus) -> String {
    format!(
        "v{} is being deployed ({} desired)",
        status.version, status.desired_count
    )
}

pub fn format_alloc_summary(status: &DeploymentStatus) -> String {
    format!(
        "{} desired, {} placed, {} healthy, {} unhealthy",
        status.desired_count, status.placed_count, status.healthy_count, status.unhealthy_count
    )
}

fn format_alloc(alloc: &AllocationStatus) -> String {
    format!(
        "{} v{} {} {} (restarts: {}, healthy: {})",
        alloc.id, alloc.version, alloc.region, alloc.status, alloc.restarts, alloc.healthy
    )
}

/// Prints monitor events
pub struct ConsoleObserver {
    pub verbose: bool,
    pub color: bool,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleObserver {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            verbose: false,
            color: true,
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    fn emit(&self, lines: &[String]) -> Result<(), CliError> {
        let mut out = self
            .out
            .lock()
            .map_err(|_| CliError::Internal("monitor output poisoned".to_string()))?;
        for line in lines {
            writeln!(out, "{}", line)?;
        }
        out.flush()?;
        Ok(())
    }

    fn heading(&self, text: &str) -> String {
        if self.color {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn error_heading(&self, text: &str) -> String {
        if self.color {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn recent_logs(&self, alloc: &AllocationStatus) -> Result<Vec<String>, CliError> {
        let mut presenter = LogPresenter::new(Box::new(io::sink()));
        presenter.color = self.color;
        presenter.hide_instance = true;
        presenter.hide_region = true;
        presenter.remove_newlines = true;

        alloc
            .recent_logs
            .iter()
            .map(|e| {
                presenter
                    .format(&LogEntry::from(e.clone()))
                    .map(|line| format!("    {}", line))
            })
            .collect()
    }
}

impl DeploymentObserver for ConsoleObserver {
    fn started(&self, index: usize, status: &DeploymentStatus) -> Result<(), CliError> {
        let mut lines = Vec::new();
        if index > 0 {
            lines.push(String::new());
        }
        lines.push(format_deployment_summary(status));
        self.emit(&lines)
    }

    fn updated(
        &self,
        status: &DeploymentStatus,
        changed: &[AllocationStatus],
    ) -> Result<(), CliError> {
        let mut lines = vec![format_alloc_summary(status)];
        if self.verbose {
            lines.extend(changed.iter().map(format_alloc));
        }
        self.emit(&lines)
    }

    fn failed(&self, status: &DeploymentStatus, failed: &[AllocationStatus]) -> Result<(), CliError> {
        let mut lines = vec![format!(
            "v{} {} - {}",
            status.version, status.status, status.description
        )];
        if !failed.is_empty() {
            lines.push(String::new());
            lines.push(self.error_heading("Failed Instances"));
        }
        self.emit(&lines)
    }

    fn diagnostics(
        &self,
        _status: &DeploymentStatus,
        details: Vec<Result<AllocationStatus, CliError>>,
    ) -> Result<(), CliError> {
        let mut lines = Vec::new();
        let mut count = 0;

        for detail in details {
            let alloc = match detail {
                Ok(alloc) => alloc,
                Err(e) => {
                    lines.push(self.error_heading(&format!("Error fetching instance: {}", e)));
                    continue;
                }
            };

            count += 1;
            lines.push(String::new());
            lines.push(self.error_heading(&format!("  Failure #{}", count)));
            lines.push(format!("    {}", format_alloc(&alloc)));

            lines.push(self.heading("  Recent Events"));
            for event in &alloc.events {
                lines.push(format!("    {} {} {}", event.timestamp, event.kind, event.message));
            }

            lines.push(self.heading("  Recent Logs"));
            lines.extend(self.recent_logs(&alloc)?);
        }

        self.emit(&lines)
    }

    fn succeeded(&self, status: &DeploymentStatus) -> Result<(), CliError> {
        self.emit(&[format!("v{} deployed successfully", status.version)])
    }
}
