//! Tour runtime state machine — tracks the single live tour run.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{TourDefinition, TourId, TourStepId};

/// Lifecycle of a tour run.
///
/// Idle → Active → Completed | Cancelled. Both terminal states behave like
/// Idle for the next `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TourStatus {
    #[default]
    Idle,
    Active,
    Completed,
    Cancelled,
}

impl TourStatus {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: TourStatus) -> bool {
        use TourStatus::*;
        matches!(
            (self, target),
            (Idle | Completed | Cancelled, Active) | (Active, Completed) | (Active, Cancelled)
        )
    }

    /// Whether this status ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for TourStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Identity of one requested step reveal. A wait that settles with a
/// ticket that is no longer current must be discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepTicket {
    pub run_id: Uuid,
    pub seq: u64,
    pub index: usize,
    pub step_id: TourStepId,
}

/// What a terminal transition left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedRun {
    pub tour_id: TourId,
    pub step_id: Option<TourStepId>,
}

/// The engine's single mutable aggregate.
#[derive(Debug, Default)]
pub struct TourRuntimeState {
    pub active_tour_id: Option<TourId>,
    pub run_id: Option<Uuid>,
    pub current_step_index: usize,
    pub status: TourStatus,
    /// Route-triggered steps already revealed during this run.
    pub shown_route_steps: HashSet<TourStepId>,
    definition: Option<Arc<TourDefinition>>,
    reveal_seq: u64,
}

impl TourRuntimeState {
    pub fn definition(&self) -> Option<&Arc<TourDefinition>> {
        self.definition.as_ref()
    }

    pub fn current_step_id(&self) -> Option<TourStepId> {
        self.definition
            .as_ref()
            .and_then(|d| d.step(self.current_step_index))
            .map(|s| s.id)
    }

    /// Enter Active for `definition`. Returns the new run id.
    pub fn begin_run(&mut self, definition: Arc<TourDefinition>) -> Result<Uuid, String> {
        if !self.status.can_transition_to(TourStatus::Active) {
            return Err(format!(
                "Cannot start {} while {}",
                definition.id, self.status
            ));
        }
        let run_id = Uuid::new_v4();
        self.active_tour_id = Some(definition.id);
        self.run_id = Some(run_id);
        self.current_step_index = 0;
        self.status = TourStatus::Active;
        self.shown_route_steps.clear();
        self.definition = Some(definition);
        Ok(run_id)
    }

    /// Leave Active for `outcome`, resetting everything run-scoped.
    pub fn finish_run(&mut self, outcome: TourStatus) -> Result<FinishedRun, String> {
        if !outcome.is_terminal() || !self.status.can_transition_to(outcome) {
            return Err(format!("Cannot transition from {} to {}", self.status, outcome));
        }
        let tour_id = self
            .active_tour_id
            .ok_or_else(|| "No active tour".to_string())?;
        let finished = FinishedRun {
            tour_id,
            step_id: self.current_step_id(),
        };

        self.active_tour_id = None;
        self.run_id = None;
        self.current_step_index = 0;
        self.status = outcome;
        self.shown_route_steps.clear();
        self.definition = None;
        // Invalidate every outstanding ticket
        self.reveal_seq += 1;
        Ok(finished)
    }

    /// Make `index` the current step and issue a ticket for revealing it.
    pub fn issue_ticket(&mut self, index: usize) -> Option<StepTicket> {
        let run_id = self.run_id?;
        let step_id = self.definition.as_ref()?.step(index)?.id;
        self.current_step_index = index;
        self.reveal_seq += 1;
        Some(StepTicket {
            run_id,
            seq: self.reveal_seq,
            index,
            step_id,
        })
    }

    /// Whether `ticket` is still the most recent reveal of the live run.
    pub fn is_current(&self, ticket: &StepTicket) -> bool {
        self.status.is_active()
            && self.run_id == Some(ticket.run_id)
            && self.reveal_seq == ticket.seq
            && self.current_step_id() == Some(ticket.step_id)
    }

    /// Record a route-triggered step as shown. Returns `false` if it
    /// already was during this run.
    pub fn mark_route_step_shown(&mut self, step: TourStepId) -> bool {
        self.shown_route_steps.insert(step)
    }

    pub fn snapshot(&self) -> RuntimeSnapshot {
        RuntimeSnapshot {
            active_tour_id: self.active_tour_id,
            current_step_index: self.current_step_index,
            current_step_id: self.current_step_id(),
            status: self.status,
            route_steps_shown: self.shown_route_steps.len(),
        }
    }
}

/// Read-only view of the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeSnapshot {
    pub active_tour_id: Option<TourId>,
    pub current_step_index: usize,
    pub current_step_id: Option<TourStepId>,
    pub status: TourStatus,
    pub route_steps_shown: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GuidedBookingStep, TourCatalog};

    fn definition(id: TourId) -> Arc<TourDefinition> {
        TourCatalog::builtin().get_definition(id).unwrap()
    }

    #[test]
    fn valid_transitions() {
        use TourStatus::*;
        let transitions = [
            (Idle, Active),
            (Active, Completed),
            (Active, Cancelled),
            (Completed, Active),
            (Cancelled, Active),
        ];
        for (from, to) in transitions {
            assert!(from.can_transition_to(to), "{from} should transition to {to}");
        }
    }

    #[test]
    fn invalid_transitions() {
        use TourStatus::*;
        assert!(!Active.can_transition_to(Active));
        assert!(!Idle.can_transition_to(Completed));
        assert!(!Idle.can_transition_to(Cancelled));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Active.can_transition_to(Idle));
    }

    #[test]
    fn display_matches_serde() {
        use TourStatus::*;
        for status in [Idle, Active, Completed, Cancelled] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(format!("\"{status}\""), json);
        }
    }

    #[test]
    fn run_lifecycle_resets_state() {
        let mut state = TourRuntimeState::default();
        let run = state.begin_run(definition(TourId::GuidedBooking)).unwrap();
        assert_eq!(state.run_id, Some(run));
        assert!(state.begin_run(definition(TourId::Renter)).is_err());

        state.issue_ticket(3).unwrap();
        assert!(state.mark_route_step_shown(GuidedBookingStep::CarDetail.into()));
        assert!(!state.mark_route_step_shown(GuidedBookingStep::CarDetail.into()));

        let finished = state.finish_run(TourStatus::Cancelled).unwrap();
        assert_eq!(finished.tour_id, TourId::GuidedBooking);
        assert_eq!(finished.step_id, Some(TourStepId::from(GuidedBookingStep::CarDetail)));
        assert_eq!(state.status, TourStatus::Cancelled);
        assert!(state.active_tour_id.is_none());
        assert!(state.shown_route_steps.is_empty());
        assert!(state.finish_run(TourStatus::Completed).is_err());

        // A fresh run starts from a clean shown-set
        state.begin_run(definition(TourId::GuidedBooking)).unwrap();
        assert!(state.mark_route_step_shown(GuidedBookingStep::CarDetail.into()));
    }

    #[test]
    fn newer_ticket_supersedes_older() {
        let mut state = TourRuntimeState::default();
        state.begin_run(definition(TourId::Renter)).unwrap();

        let first = state.issue_ticket(0).unwrap();
        assert!(state.is_current(&first));

        let second = state.issue_ticket(1).unwrap();
        assert!(!state.is_current(&first));
        assert!(state.is_current(&second));

        state.finish_run(TourStatus::Completed).unwrap();
        assert!(!state.is_current(&second));
    }

    #[test]
    fn ticket_for_missing_step_is_refused() {
        let mut state = TourRuntimeState::default();
        assert!(state.issue_ticket(0).is_none());
        state.begin_run(definition(TourId::Renter)).unwrap();
        assert!(state.issue_ticket(4).is_none());
        assert_eq!(state.current_step_index, 0);
    }

    #[test]
    fn finish_requires_terminal_outcome() {
        let mut state = TourRuntimeState::default();
        state.begin_run(definition(TourId::Renter)).unwrap();
        assert!(state.finish_run(TourStatus::Idle).is_err());
        assert!(state.finish_run(TourStatus::Active).is_err());
        assert!(state.status.is_active());
    }
}
