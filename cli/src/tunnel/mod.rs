//! Tunnel into an organization's private network
//!
//! The core only needs two things from the tunnel: establish a dialer scoped
//! to an organization, and use that dialer to run a command or an HTTP round
//! trip against an address inside the network. Both are traits so recipes can
//! be exercised without a live agent.

pub mod agent;

use async_trait::async_trait;
use platform_api::Organization;
use serde::{Deserialize, Serialize};

use crate::errors::CliError;

/// Captured output of a remote command
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

/// An HTTP request addressed to a machine inside the tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelRequest {
    pub method: String,
    pub addr: String,
    pub port: u16,
    pub path: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// Raw response to a [`TunnelRequest`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelResponse {
    pub status: u16,
    pub body: String,
}

impl TunnelResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Connection into one organization's network
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Slug of the organization this dialer is scoped to
    fn organization(&self) -> &str;

    /// Run `command` on `addr`, capturing stdout and stderr separately
    async fn exec(&self, addr: &str, command: &str) -> Result<ExecOutput, CliError>;

    /// Perform an HTTP round trip to a port on a machine
    async fn round_trip(&self, request: TunnelRequest) -> Result<TunnelResponse, CliError>;

    /// Tear down the tunnel
    async fn close(&self) -> Result<(), CliError>;
}

/// Broker that builds dialers
#[async_trait]
pub trait TunnelAgent: Send + Sync {
    /// Establish a dialer for `org`; may block until the agent confirms
    /// connectivity
    async fn establish(&self, org: &Organization) -> Result<Box<dyn Dialer>, CliError>;
}
