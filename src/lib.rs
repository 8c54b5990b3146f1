//! Two-phase commit simulator
//!
//! A coordinator drives prepare/commit/abort rounds against in-process
//! participants, with injectable failures on the participant side.

pub mod config;
pub mod error;
pub mod logger;
pub mod simulation;
pub mod two_phase_commit;

pub use config::{SimulationConfig, Timing};
pub use error::{Result, TwoPcError};
pub use simulation::{RunReport, Simulation};
