//! Phase machine for role-ordered recipes

use serde::{Deserialize, Serialize};

/// Recipe phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipePhase {
    /// Asking every target for its role
    DiscoverRoles,

    /// Acting on replicas
    ActOnReplicas,

    /// Handing leadership away from the current leader
    FailoverLeader,

    /// Acting on the former leader
    ActOnLeader,

    /// Finished
    Done,

    /// Stopped on the first error; earlier phases are not rolled back
    Aborted,
}

/// Phase event
#[derive(Debug, Clone)]
pub enum PhaseEvent {
    RolesDiscovered,
    ReplicasDone,
    FailoverDone,
    LeaderDone,
    Failed(String),
}

/// Strictly linear phase machine; there is no way back to an earlier phase
#[derive(Debug, Clone)]
pub struct PhaseMachine {
    phase: RecipePhase,
    error: Option<String>,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self {
            phase: RecipePhase::DiscoverRoles,
            error: None,
        }
    }

    pub fn phase(&self) -> RecipePhase {
        self.phase
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        matches!(self.phase, RecipePhase::Done | RecipePhase::Aborted)
    }

    /// Process an event and transition
    pub fn process(&mut self, event: PhaseEvent) -> Result<(), String> {
        let next = match (self.phase, &event) {
            (RecipePhase::DiscoverRoles, PhaseEvent::RolesDiscovered) => RecipePhase::ActOnReplicas,
            (RecipePhase::ActOnReplicas, PhaseEvent::ReplicasDone) => RecipePhase::FailoverLeader,
            (RecipePhase::FailoverLeader, PhaseEvent::FailoverDone) => RecipePhase::ActOnLeader,
            (RecipePhase::ActOnLeader, PhaseEvent::LeaderDone) => RecipePhase::Done,

            (phase, PhaseEvent::Failed(err)) if !self.is_finished() => {
                self.error = Some(format!("{:?}: {}", phase, err));
                RecipePhase::Aborted
            }

            (phase, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", phase, event));
            }
        };

        self.phase = next;
        Ok(())
    }
}

impl Default for PhaseMachine {
    fn default() -> Self {
        Self::new()
    }
}
