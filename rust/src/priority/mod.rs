//! Priority tier engine for scarce categories.
//!
//! One engine instance per (category, period): tiers come from the persisted
//! record, the quota cascade picks who gets the scarce day, and the rest-cycle
//! placement writes the result onto the grid while policing incidental hits.

mod cascade;
mod cycle;
mod state;

pub use cascade::{CascadeSelection, MeritVerdict, PriorityError, ScarceCategory, TierEngine};
pub use cycle::{apply_rest_cycle, CycleOutcome, MeritDecision, RestCycle};
pub use state::{
    period_of, tier_for, PriorityRecord, PriorityState, RecordError, MAX_TIER, MIN_TIER,
    NEVER_ELAPSED,
};
