//! Data model for per-domain certificate state.
//!
//! A `DomainRecord` is the canonical unit of state: one per normalized
//! hostname, holding the last observation, renewal policy inputs, and the
//! append-only repair audit trail.

mod attempt;
mod observation;
mod record;

pub use attempt::{
    Approval, AttemptOutcome, InFlightRepair, JournalEntry, PolicyDecision, PolicyReason,
    RepairAttempt, Transition, TransitionKind,
};
pub use observation::{Observation, Severity};
pub use record::{DomainRecord, EscalationLevel, HealthState, RenewalMode};
