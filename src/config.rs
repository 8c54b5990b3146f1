//! Simulation configuration

use crate::error::{Result, TwoPcError};
use crate::two_phase_commit::chance::DEFAULT_SUCCESS_PROBABILITY;
use crate::two_phase_commit::{FaultPlan, ParticipantId, RoundRequest, TransactionId};
use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

/// Converts the simulator's abstract time units into wall-clock durations.
///
/// One unit is a second by default; tests and demos shrink it to keep runs
/// short without changing any ratio between delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    pub time_unit: Duration,
    /// Upper bound (inclusive) of participant network jitter.
    pub max_jitter_units: u32,
    /// Simulated durable-write latency after a commit.
    pub commit_flush_units: u32,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            time_unit: Duration::from_secs(1),
            max_jitter_units: 10,
            commit_flush_units: 1,
        }
    }
}

impl Timing {
    pub fn from_millis(unit_ms: u64) -> Self {
        Self {
            time_unit: Duration::from_millis(unit_ms),
            ..Self::default()
        }
    }

    pub fn with_max_jitter_units(mut self, units: u32) -> Self {
        self.max_jitter_units = units;
        self
    }

    pub fn with_commit_flush_units(mut self, units: u32) -> Self {
        self.commit_flush_units = units;
        self
    }

    pub fn units(&self, n: u32) -> Duration {
        self.time_unit * n
    }

    /// Longest delivery delay a participant may add before it acknowledges.
    pub fn max_jitter(&self) -> Duration {
        self.units(self.max_jitter_units)
    }

    pub fn commit_flush(&self) -> Duration {
        self.units(self.commit_flush_units)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Participants allowed to vote `Yes`.
    pub clients: BTreeSet<ParticipantId>,
    pub participant_count: u32,
    pub transaction_ids: Vec<TransactionId>,
    /// How long the coordinator waits for each acknowledged vote, in time units.
    pub timeout_units: u32,
    /// How long the harness waits for outcomes, in time units.
    pub sleep_time_units: u32,
    pub faults: FaultPlan,
    /// Register every instantiated participant instead of only the clients.
    pub register_all: bool,
    pub success_probability: f64,
    pub seed: Option<u64>,
    pub timing: Timing,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            clients: BTreeSet::new(),
            participant_count: 2,
            transaction_ids: Vec::new(),
            timeout_units: 5,
            sleep_time_units: 15,
            faults: FaultPlan::default(),
            register_all: false,
            success_probability: DEFAULT_SUCCESS_PROBABILITY,
            seed: None,
            timing: Timing::default(),
        }
    }
}

impl SimulationConfig {
    pub fn timeout(&self) -> Duration {
        self.timing.units(self.timeout_units)
    }

    pub fn sleep_time(&self) -> Duration {
        self.timing.units(self.sleep_time_units)
    }

    /// Ids of every participant the simulation instantiates.
    pub fn participant_ids(&self) -> impl Iterator<Item = ParticipantId> {
        1..=self.participant_count
    }

    pub fn round_request(&self) -> RoundRequest {
        RoundRequest {
            eligible_clients: self.clients.clone(),
            participant_count: self.participant_count as usize,
            timeout: self.timeout(),
            faults: self.faults.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.participant_count == 0 {
            return Err(TwoPcError::InvalidConfig(
                "participant-count must be at least 1".to_string(),
            ));
        }

        if self.clients.is_empty() {
            return Err(TwoPcError::InvalidConfig(
                "at least one client id is required".to_string(),
            ));
        }

        if let Some(id) = self
            .clients
            .iter()
            .find(|id| **id == 0 || **id > self.participant_count)
        {
            return Err(TwoPcError::InvalidConfig(format!(
                "client {} is outside participants 1..={}",
                id, self.participant_count
            )));
        }

        if self.transaction_ids.is_empty() {
            return Err(TwoPcError::InvalidConfig(
                "at least one transaction id is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        if let Some(id) = self.transaction_ids.iter().find(|id| !seen.insert(**id)) {
            return Err(TwoPcError::DuplicateTransaction(*id));
        }

        if let Some((id, _)) = self
            .faults
            .overrides()
            .find(|(id, _)| *id == 0 || *id > self.participant_count)
        {
            return Err(TwoPcError::InvalidFault(format!(
                "participant {} does not exist",
                id
            )));
        }

        if !(0.0..=1.0).contains(&self.success_probability) {
            return Err(TwoPcError::InvalidConfig(format!(
                "success probability {} is not within [0, 1]",
                self.success_probability
            )));
        }

        if self.timing.time_unit.is_zero() {
            return Err(TwoPcError::InvalidConfig(
                "time unit must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
