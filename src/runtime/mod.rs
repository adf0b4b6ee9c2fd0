//! Tour runtime — the orchestrator and the state it guards.

pub mod engine;
pub mod state;

pub use engine::{StartOutcome, TourDeps, TourRuntime};
pub use state::{RuntimeSnapshot, StepTicket, TourRuntimeState, TourStatus};
