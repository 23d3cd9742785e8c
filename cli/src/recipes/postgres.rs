//! Postgres cluster recipes
//!
//! Reboot and upgrade share one role-ordered sequence: discover roles, act on
//! replicas, fail the leader over, then act on the former leader. The only
//! difference is the per-machine action.

use tracing::{info, warn};

use crate::errors::CliError;
use crate::recipes::machines::{replace_machine, WaitOptions};
use crate::recipes::operation::RemoteOperation;
use crate::recipes::phase::{PhaseEvent, PhaseMachine, RecipePhase};
use crate::recipes::roles::RoleGroup;
use crate::recipes::session::RecipeSession;
use crate::recipes::target::Target;

pub const PG_ROLE_SCRIPT: &str = "/fly/scripts/role";
pub const PG_RESTART_SCRIPT: &str = "/fly/scripts/restart";
pub const PG_FAILOVER_SCRIPT: &str = "/fly/scripts/trigger-failover";
pub const PG_IS_HEALTHY_SCRIPT: &str = "/fly/scripts/healthy";
pub const PG_CONNECT_SCRIPT: &str = "/fly/scripts/connect";
pub const PG_RUN_SQL_SCRIPT: &str = "/fly/scripts/run_sql";

/// What to do to each replica and then the former leader
#[derive(Debug, Clone)]
pub enum RoleAction {
    Restart,
    Replace { image: String, wait: WaitOptions },
}

/// A machine swapped out by an upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub old_machine_id: String,
    pub new_machine_id: String,
}

#[derive(Debug, Clone)]
pub struct RecipeReport {
    pub roles: RoleGroup,
    pub phase: RecipePhase,
    pub replacements: Vec<Replacement>,
}

/// Restart replicas, fail over, then restart the former leader
pub async fn postgres_reboot(session: RecipeSession) -> Result<RecipeReport, CliError> {
    run_recipe(session, RoleAction::Restart).await
}

/// Replace every member with a machine running `image`, leader last
pub async fn postgres_upgrade(
    session: RecipeSession,
    image: &str,
    wait: WaitOptions,
) -> Result<RecipeReport, CliError> {
    if image.trim().is_empty() {
        session.close().await.ok();
        return Err(CliError::ValidationError("target image is required".to_string()));
    }
    run_recipe(
        session,
        RoleAction::Replace {
            image: image.to_string(),
            wait,
        },
    )
    .await
}

/// Run a SQL statement on the current leader and return its output
pub async fn postgres_sql(mut session: RecipeSession, sql: &str) -> Result<String, CliError> {
    let command = format!("{} {}", PG_RUN_SQL_SCRIPT, shell_quote(sql));
    let result = run_on_leader(&mut session, &command).await;
    session.close().await.ok();
    result
}

async fn run_on_leader(session: &mut RecipeSession, command: &str) -> Result<String, CliError> {
    let targets = session.targets().await?;
    let discovered = session.run_batch(&targets, PG_ROLE_SCRIPT).await?;
    check_all(discovered.clone())?;

    let roles = RoleGroup::from_operations(&discovered);
    let leader = roles.leaders().first().cloned().ok_or_else(|| {
        CliError::RecipeError(format!("no leader found for {}", session.app().name))
    })?;

    let mut ops = session.run_batch(std::slice::from_ref(&leader), command).await?;
    match ops.pop() {
        Some(op) => Ok(op.into_checked()?.result),
        None => Err(CliError::Internal("empty batch result".to_string())),
    }
}

fn shell_quote(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}

/// Run the role sequence and close the session whatever the outcome
pub async fn run_recipe(
    mut session: RecipeSession,
    action: RoleAction,
) -> Result<RecipeReport, CliError> {
    let mut phases = PhaseMachine::new();
    let result = run_role_sequence(&mut session, &action, &mut phases).await;

    if let Err(e) = &result {
        if phases.process(PhaseEvent::Failed(e.to_string())).is_ok() {
            warn!("Recipe aborted in {}", phases.error().unwrap_or_default());
        }
    }

    session.close().await.ok();
    result
}

async fn run_role_sequence(
    session: &mut RecipeSession,
    action: &RoleAction,
    phases: &mut PhaseMachine,
) -> Result<RecipeReport, CliError> {
    let targets = session.targets().await?;
    if targets.is_empty() {
        return Err(CliError::RecipeError(format!(
            "no machines found for {}",
            session.app().name
        )));
    }

    let discovered = session.run_batch(&targets, PG_ROLE_SCRIPT).await?;
    let discovered = discovered
        .into_iter()
        .map(|op| op.into_checked())
        .collect::<Result<Vec<_>, _>>()?;

    let roles = RoleGroup::from_operations(&discovered);
    for (role, members) in roles.others() {
        session.progress().note(&format!(
            "Skipping {} machine(s) reporting role {:?}",
            members.len(),
            role
        ));
    }
    info!(
        "Discovered {} leader(s), {} replica(s)",
        roles.leaders().len(),
        roles.replicas().len()
    );
    advance(phases, PhaseEvent::RolesDiscovered)?;

    let mut replacements = Vec::new();

    replacements.extend(act(session, roles.replicas(), action).await?);
    advance(phases, PhaseEvent::ReplicasDone)?;

    check_all(session.run_batch(roles.leaders(), PG_FAILOVER_SCRIPT).await?)?;
    advance(phases, PhaseEvent::FailoverDone)?;

    replacements.extend(act(session, roles.leaders(), action).await?);
    advance(phases, PhaseEvent::LeaderDone)?;

    Ok(RecipeReport {
        roles,
        phase: phases.phase(),
        replacements,
    })
}

async fn act(
    session: &mut RecipeSession,
    targets: &[Target],
    action: &RoleAction,
) -> Result<Vec<Replacement>, CliError> {
    match action {
        RoleAction::Restart => {
            check_all(session.run_batch(targets, PG_RESTART_SCRIPT).await?)?;
            Ok(Vec::new())
        }
        RoleAction::Replace { image, wait } => {
            let mut replaced = Vec::with_capacity(targets.len());
            for target in targets {
                let new_target =
                    replace_machine(session, target, image, PG_IS_HEALTHY_SCRIPT, wait).await?;
                replaced.push(Replacement {
                    old_machine_id: target.machine_id.clone(),
                    new_machine_id: new_target.machine_id,
                });
            }
            Ok(replaced)
        }
    }
}

fn check_all(operations: Vec<RemoteOperation>) -> Result<(), CliError> {
    for op in operations {
        op.into_checked()?;
    }
    Ok(())
}

fn advance(phases: &mut PhaseMachine, event: PhaseEvent) -> Result<(), CliError> {
    phases.process(event).map_err(CliError::Internal)
}
