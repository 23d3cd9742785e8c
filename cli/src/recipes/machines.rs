//! Machine lifecycle helpers used by recipes

use std::time::Duration;

use platform_api::{LaunchMachineInput, Machine, MachineState};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::errors::CliError;
use crate::http::api::ControlPlane;
use crate::recipes::session::RecipeSession;
use crate::recipes::target::Target;

#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Poll a machine until it reports `state`
pub async fn wait_for_machine_state(
    client: &dyn ControlPlane,
    app_name: &str,
    machine_id: &str,
    state: MachineState,
    options: &WaitOptions,
    cancel: &CancellationToken,
) -> Result<Machine, CliError> {
    let deadline = Instant::now() + options.timeout;

    loop {
        let machine = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliError::Cancelled),
            machine = client.get_machine(app_name, machine_id) => machine?,
        };

        if machine.state == state {
            return Ok(machine);
        }
        debug!("Machine {} is {}, waiting for {}", machine_id, machine.state, state);

        if Instant::now() + options.interval > deadline {
            return Err(CliError::Timeout(format!(
                "machine {} did not reach {} within {:?}",
                machine_id, state, options.timeout
            )));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CliError::Cancelled),
            _ = tokio::time::sleep(options.interval) => {}
        }
    }
}

/// Replace a machine with one running `image`
///
/// Stops and destroys the old machine through its machine API, launches a
/// replacement in the same region with a copy of its config, waits for it to
/// start and runs `health_command` on it. Returns the new target.
pub async fn replace_machine(
    session: &mut RecipeSession,
    target: &Target,
    image: &str,
    health_command: &str,
    wait: &WaitOptions,
) -> Result<Target, CliError> {
    session
        .run_http(target, "POST", &format!("/v1/machines/{}/stop", target.machine_id))
        .await?
        .into_checked()?;

    session
        .run_http(target, "DELETE", &format!("/v1/machines/{}/", target.machine_id))
        .await?
        .into_checked()?;

    let input = LaunchMachineInput {
        app_id: session.app().id.clone(),
        region: target.region.clone(),
        config: target.config.with_image(image),
    };

    session
        .progress()
        .note(&format!("Launching new machine to replace {}", target.machine_id));
    let launched = session
        .client()
        .launch_machine(&session.app().name, &input)
        .await?;
    info!("Launched {} to replace {}", launched.id, target.machine_id);

    let started = wait_for_machine_state(
        session.client(),
        &session.app().name,
        &launched.id,
        MachineState::Started,
        wait,
        session.cancel_token(),
    )
    .await?;

    let replacement = Target::from_machine(session.app(), &started)?;
    for op in session
        .run_batch(std::slice::from_ref(&replacement), health_command)
        .await?
    {
        op.into_checked()?;
    }

    Ok(replacement)
}
