//! Recipe session: one tunnel, one app, one batch at a time

use std::sync::Arc;
use std::time::Duration;

use platform_api::{App, MachineState};
use secrecy::SecretString;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::errors::CliError;
use crate::http::api::ControlPlane;
use crate::recipes::operation::{MachineApiAuth, Progress, RemoteOperation};
use crate::recipes::target::Target;
use crate::tunnel::{Dialer, TunnelAgent};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bounded wait for the tunnel to come up
    pub tunnel_timeout: Duration,
    /// Token presented to the on-machine API
    pub auth_token: SecretString,
}

/// Resources held for the duration of one recipe invocation
///
/// Every dispatch takes `&mut self`, so a session never has more than one
/// batch in flight.
pub struct RecipeSession {
    app: App,
    client: Arc<dyn ControlPlane>,
    dialer: Box<dyn Dialer>,
    auth: MachineApiAuth,
    progress: Arc<dyn Progress>,
    cancel: CancellationToken,
}

impl RecipeSession {
    /// Establish a tunnel for the app's organization
    ///
    /// Fails without retrying when the tunnel is not up within
    /// `options.tunnel_timeout`.
    pub async fn open(
        app: App,
        client: Arc<dyn ControlPlane>,
        agent: &dyn TunnelAgent,
        options: SessionOptions,
        progress: Arc<dyn Progress>,
        cancel: CancellationToken,
    ) -> Result<Self, CliError> {
        info!("Opening recipe session for {} ({})", app.name, app.organization.slug);

        let establish = tokio::time::timeout(options.tunnel_timeout, agent.establish(&app.organization));
        let dialer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliError::Cancelled),
            established = establish => match established {
                Ok(dialer) => dialer?,
                Err(_) => {
                    return Err(CliError::Timeout(format!(
                        "tunnel for {} not established within {:?}",
                        app.organization.slug, options.tunnel_timeout
                    )))
                }
            },
        };

        let auth = MachineApiAuth {
            app_name: app.name.clone(),
            token: options.auth_token,
        };

        Ok(Self {
            app,
            client,
            dialer,
            auth,
            progress,
            cancel,
        })
    }

    pub fn app(&self) -> &App {
        &self.app
    }

    pub fn client(&self) -> &dyn ControlPlane {
        self.client.as_ref()
    }

    pub fn progress(&self) -> &dyn Progress {
        self.progress.as_ref()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Resolve the app's live machines into targets
    pub async fn targets(&self) -> Result<Vec<Target>, CliError> {
        let machines = self.client.list_machines(&self.app.name, None).await?;

        machines
            .iter()
            .filter(|m| !matches!(m.state, MachineState::Destroying | MachineState::Destroyed))
            .map(|m| Target::from_machine(&self.app, m))
            .collect()
    }

    /// Run `command` on each target in order
    ///
    /// A transport error stops the batch; targets after the failing one are
    /// never dispatched.
    pub async fn run_batch(
        &mut self,
        targets: &[Target],
        command: &str,
    ) -> Result<Vec<RemoteOperation>, CliError> {
        let mut operations = Vec::with_capacity(targets.len());
        for target in targets {
            let op = RemoteOperation::exec(target.clone(), command);
            operations.push(self.dispatch(op).await?);
        }
        Ok(operations)
    }

    /// Run one HTTP request against the target's machine API
    pub async fn run_http(
        &mut self,
        target: &Target,
        method: &str,
        path: &str,
    ) -> Result<RemoteOperation, CliError> {
        self.dispatch(RemoteOperation::http(target.clone(), method, path))
            .await
    }

    async fn dispatch(&mut self, op: RemoteOperation) -> Result<RemoteOperation, CliError> {
        if self.cancel.is_cancelled() {
            return Err(CliError::Cancelled);
        }

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CliError::Cancelled),
            executed = op.execute(self.dialer.as_ref(), &self.auth, self.progress.as_ref()) => executed,
        }
    }

    /// Tear down the tunnel
    pub async fn close(self) -> Result<(), CliError> {
        debug!("Closing recipe session for {}", self.app.name);
        self.dialer.close().await.inspect_err(|e| {
            warn!("Failed to close tunnel for {}: {}", self.app.organization.slug, e);
        })
    }
}
