//! Room-level phase machine with two-step planned transitions.
//!
//! Persistence and broadcasts happen between planning and applying a
//! transition; an aborted plan leaves the room phase untouched, so a failed
//! side effect can never strand the room in a half-applied state.

use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level phases a room can be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomPhase {
    /// No round is running; the host configures rounds and pattern.
    Idle,
    /// A round is active and in one of the play sub-phases.
    RoundRunning(RoundActivity),
    /// The event finished; a reset is required before playing again.
    Ended,
}

/// Fine-grained activity while a round runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoundActivity {
    /// Clips play, squares get marked, claims are accepted.
    Playing,
    /// A win claim froze the room pending host review.
    PausedForReview {
        /// Participant whose claim opened the review.
        claimant: String,
    },
    /// The round completed; the host may advance or end the event.
    RoundOver,
}

impl RoomPhase {
    /// Whether the room is frozen waiting on a win-claim review.
    pub fn paused_for_verification(&self) -> bool {
        matches!(
            self,
            RoomPhase::RoundRunning(RoundActivity::PausedForReview { .. })
        )
    }
}

/// Events that can be applied to the room phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomEvent {
    /// A planned round goes active.
    StartRound,
    /// A win claim opened a host review.
    PauseForReview {
        /// Claimant that triggered the pause.
        claimant: String,
    },
    /// A review resolved without a win; play continues.
    ResumePlay,
    /// The active round completed (explicitly or through an approved win).
    RoundCompleted,
    /// The final round's win was approved or the host ended the event.
    SessionEnded,
    /// Whole-event reset back to idle.
    ResetEvent,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the machine was in when the invalid event was received.
    pub from: RoomPhase,
    /// The event that cannot be applied from this phase.
    pub event: RoomEvent,
}

/// Errors that can occur when planning a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// Phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when the plan was created.
        expected: RoomPhase,
        /// Current phase.
        actual: RoomPhase,
    },
}

/// Errors that can occur when aborting a planned transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned phase transition.
pub type PlanId = Uuid;

/// A validated but not yet applied phase transition.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the machine is currently in.
    pub from: RoomPhase,
    /// Phase the machine will transition to.
    pub to: RoomPhase,
    /// Event that triggered this transition.
    pub event: RoomEvent,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// The room phase machine. One per room, owned by the room task.
#[derive(Debug, Clone)]
pub struct RoomPhaseMachine {
    phase: RoomPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for RoomPhaseMachine {
    fn default() -> Self {
        Self {
            phase: RoomPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl RoomPhaseMachine {
    /// Create a machine initialised in the idle phase.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> &RoomPhase {
        &self.phase
    }

    /// Transition counter; increments on every applied plan.
    pub fn version(&self) -> usize {
        self.version
    }

    /// Plan a transition by validating the event against the current phase.
    pub fn plan(&mut self, event: RoomEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event.clone())
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase.clone(),
            to: next,
            event,
            pending_since: Instant::now(),
        };
        self.pending = Some(plan.clone());
        Ok(plan)
    }

    /// Apply a planned transition, returning the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<RoomPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase.clone(),
            });
        }

        self.phase = plan.to;
        self.version += 1;
        Ok(self.phase.clone())
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;
        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }
        self.pending = None;
        Ok(())
    }

    /// Plan and immediately apply `event`, for transitions with no side
    /// effects between validation and commit.
    pub fn transition(&mut self, event: RoomEvent) -> Result<RoomPhase, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }
        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;
        self.phase = next.clone();
        self.version += 1;
        Ok(next)
    }

    fn compute_transition(&self, event: RoomEvent) -> Result<RoomPhase, InvalidTransition> {
        use RoomPhase::*;
        use RoundActivity::*;

        let next = match (self.phase.clone(), event) {
            (Idle, RoomEvent::StartRound) => RoundRunning(Playing),
            (RoundRunning(RoundOver), RoomEvent::StartRound) => RoundRunning(Playing),
            // Starting another round mid-play auto-completes the previous one.
            (RoundRunning(Playing), RoomEvent::StartRound) => RoundRunning(Playing),
            (RoundRunning(Playing), RoomEvent::PauseForReview { claimant }) => {
                RoundRunning(PausedForReview { claimant })
            }
            (RoundRunning(PausedForReview { .. }), RoomEvent::ResumePlay) => RoundRunning(Playing),
            (RoundRunning(Playing), RoomEvent::RoundCompleted)
            | (RoundRunning(PausedForReview { .. }), RoomEvent::RoundCompleted) => {
                RoundRunning(RoundOver)
            }
            (RoundRunning(_), RoomEvent::SessionEnded) => Ended,
            (_, RoomEvent::ResetEvent) => Idle,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}
