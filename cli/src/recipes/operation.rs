//! A single command dispatched to a single target
//!
//! Two transports are available: command execution over the tunnel, and an
//! HTTP request to the machine API port. Both report application failures as
//! data on the operation (`error_message`); only transport failures are
//! returned as errors.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use colored::Colorize;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use crate::errors::CliError;
use crate::recipes::target::{Target, MACHINE_API_PORT};
use crate::tunnel::{Dialer, ExecOutput, TunnelRequest, TunnelResponse};
use crate::utils::truncate;

const PROGRESS_RESULT_WIDTH: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Exec,
    Http,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationCommand {
    Exec(String),
    Http { method: String, path: String },
}

impl OperationCommand {
    pub fn transport(&self) -> Transport {
        match self {
            OperationCommand::Exec(_) => Transport::Exec,
            OperationCommand::Http { .. } => Transport::Http,
        }
    }
}

impl std::fmt::Display for OperationCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationCommand::Exec(command) => write!(f, "{:?}", command),
            OperationCommand::Http { method, path } => write!(f, "{} {}", method, path),
        }
    }
}

/// Credentials for the on-machine API
#[derive(Debug, Clone)]
pub struct MachineApiAuth {
    pub app_name: String,
    pub token: SecretString,
}

impl MachineApiAuth {
    fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.app_name, self.token.expose_secret());
        format!("Basic {}", BASE64.encode(raw))
    }
}

#[derive(Debug, Deserialize)]
struct MachineEnvelope {
    status: String,
    #[serde(default)]
    data: MachineEnvelopeData,
}

#[derive(Debug, Default, Deserialize)]
struct MachineEnvelopeData {
    #[serde(default)]
    error: String,
}

/// Split exec output into `(result, error_message)`
///
/// The result is stdout with one trailing `\r\n` and any surrounding quotes
/// removed. Stderr is the error message regardless of exit code.
pub fn parse_exec_output(output: ExecOutput) -> (String, String) {
    let stdout = output.stdout.strip_suffix("\r\n").unwrap_or(&output.stdout);
    let result = stdout.trim_matches('"').to_string();
    (result, output.stderr)
}

/// Split a machine API response into `(result, error_message)`
pub fn parse_http_envelope(response: TunnelResponse) -> Result<(String, String), CliError> {
    if !response.is_success() {
        return Err(CliError::TransportError(format!(
            "machine API returned {}: {}",
            response.status,
            truncate(&response.body, PROGRESS_RESULT_WIDTH)
        )));
    }

    let envelope: MachineEnvelope = serde_json::from_str(&response.body).map_err(|e| {
        CliError::TransportError(format!("malformed machine API response: {}", e))
    })?;

    Ok((envelope.status, envelope.data.error))
}

/// One command against one target
#[derive(Debug, Clone)]
pub struct RemoteOperation {
    pub target: Target,
    pub command: OperationCommand,
    pub result: String,
    pub error_message: String,
}

impl RemoteOperation {
    pub fn exec(target: Target, command: impl Into<String>) -> Self {
        Self::new(target, OperationCommand::Exec(command.into()))
    }

    pub fn http(target: Target, method: impl Into<String>, path: impl Into<String>) -> Self {
        Self::new(
            target,
            OperationCommand::Http {
                method: method.into(),
                path: path.into(),
            },
        )
    }

    fn new(target: Target, command: OperationCommand) -> Self {
        Self {
            target,
            command,
            result: String::new(),
            error_message: String::new(),
        }
    }

    pub fn transport(&self) -> Transport {
        self.command.transport()
    }

    /// True when the remote side ran and reported a failure
    pub fn failed(&self) -> bool {
        !self.error_message.trim().is_empty()
    }

    /// Escalate an application failure into an error
    pub fn into_checked(self) -> Result<Self, CliError> {
        if self.failed() {
            return Err(CliError::RemoteError {
                target: self.target.to_string(),
                message: self.error_message.trim().to_string(),
            });
        }
        Ok(self)
    }

    /// Dispatch the operation once
    pub async fn execute(
        mut self,
        dialer: &dyn Dialer,
        auth: &MachineApiAuth,
        progress: &dyn Progress,
    ) -> Result<Self, CliError> {
        progress.dispatching(&self);

        let (result, error_message) = match &self.command {
            OperationCommand::Exec(command) => {
                debug!("exec {:?} on {}", command, self.target);
                let output = dialer.exec(&self.target.addr, command).await?;
                parse_exec_output(output)
            }
            OperationCommand::Http { method, path } => {
                let request = TunnelRequest {
                    method: method.clone(),
                    addr: self.target.machine_api_addr()?,
                    port: MACHINE_API_PORT,
                    path: path.clone(),
                    headers: vec![("Authorization".to_string(), auth.header_value())],
                };
                debug!("{} {} on {}", method, path, self.target);
                let response = dialer.round_trip(request).await?;
                parse_http_envelope(response)?
            }
        };

        self.result = result;
        self.error_message = error_message;
        progress.completed(&self);
        Ok(self)
    }
}

/// Human-readable progress for recipe runs
pub trait Progress: Send + Sync {
    fn dispatching(&self, op: &RemoteOperation);
    fn completed(&self, op: &RemoteOperation);
    fn note(&self, message: &str);
}

/// Progress lines on stdout
#[derive(Debug, Default)]
pub struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn dispatching(&self, op: &RemoteOperation) {
        println!("Running {} against {}...", op.command, op.target.to_string().bold());
    }

    fn completed(&self, op: &RemoteOperation) {
        if op.failed() {
            println!("  {} {}", "error:".red(), truncate(&op.error_message, PROGRESS_RESULT_WIDTH));
        } else {
            println!("  {} {}", "result:".green(), truncate(&op.result, PROGRESS_RESULT_WIDTH));
        }
    }

    fn note(&self, message: &str) {
        println!("{}", message);
    }
}

/// Discards progress
#[derive(Debug, Default)]
pub struct SilentProgress;

impl Progress for SilentProgress {
    fn dispatching(&self, _op: &RemoteOperation) {}
    fn completed(&self, _op: &RemoteOperation) {}
    fn note(&self, _message: &str) {}
}
