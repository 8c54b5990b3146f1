//! Two-phase commit between one coordinator and a set of participants
//!
//! ## Structure
//! - `traits.rs` - `Participant` trait, the coordinator/participant seam
//! - `types.rs` - votes, states, requests, outcomes and the decision rule
//! - `coordinator.rs` - prepare rounds, vote aggregation, commit/abort
//! - `participant.rs` - simulated participant with failure injection
//! - `fault.rs` - global and per-participant fault configuration
//! - `chance.rs` - random and fixed sources of jitter and vote luck
//! - `table.rs` - coordinator-owned transaction state table
//! - `tests.rs` - protocol scenarios

pub use chance::{Chance, FixedChance, RandomChance};
pub use coordinator::{Coordinator, TransactionHandle};
pub use fault::{FaultBehavior, FaultOverride, FaultPlan, SENTINEL_PARTICIPANT};
pub use participant::{LocalState, SimulatedParticipant};
pub use traits::Participant;
pub use types::{
    decide, AbortReason, ConnectionHandle, Decision, ParticipantId, PrepareRequest, RoundRequest,
    TransactionId, TransactionOutcome, TransactionState, Vote,
};

pub mod chance;
pub mod coordinator;
pub mod fault;
pub mod participant;


mod table;
mod traits;
mod types;
