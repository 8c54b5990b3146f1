//! Bootstrap: builds participants, wires them to a coordinator and runs the
//! configured transactions.

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::two_phase_commit::{
    Chance, ConnectionHandle, Coordinator, Participant, ParticipantId, RandomChance,
    SimulatedParticipant, TransactionId, TransactionOutcome,
};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: i64,
    pub elapsed_ms: u64,
    pub committed: usize,
    pub aborted: usize,
    pub outcomes: Vec<TransactionOutcome>,
    /// Transactions still running when the harness stopped waiting.
    pub unfinished: Vec<TransactionId>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct Simulation {
    config: SimulationConfig,
    coordinator: Coordinator,
    participants: BTreeMap<ParticipantId, Arc<SimulatedParticipant>>,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Result<Self> {
        let chance: Arc<dyn Chance> =
            Arc::new(RandomChance::new(config.success_probability, config.seed));
        Self::with_chance(config, chance)
    }

    /// Builds the simulation with an explicit randomness source.
    pub fn with_chance(config: SimulationConfig, chance: Arc<dyn Chance>) -> Result<Self> {
        config.validate()?;

        let coordinator = Coordinator::new(config.timing);
        let participants: BTreeMap<ParticipantId, Arc<SimulatedParticipant>> = config
            .participant_ids()
            .map(|id| {
                let participant = SimulatedParticipant::new(id, config.timing, Arc::clone(&chance));
                (id, Arc::new(participant))
            })
            .collect();

        for (id, participant) in &participants {
            if config.register_all || config.clients.contains(id) {
                participant.connect(ConnectionHandle(u64::from(*id)));
                coordinator.register(*id, Arc::clone(participant) as Arc<dyn Participant>);
            }
        }

        info!(
            participants = participants.len(),
            registered = ?coordinator.participant_ids(),
            clients = ?config.clients,
            "Simulation ready"
        );

        Ok(Self {
            config,
            coordinator,
            participants,
        })
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn participant(&self, id: ParticipantId) -> Option<&Arc<SimulatedParticipant>> {
        self.participants.get(&id)
    }

    /// Submits every configured transaction and waits up to the sleep-time
    /// budget for their outcomes.
    pub async fn run(&self) -> Result<RunReport> {
        let started_at = Utc::now().timestamp();
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + self.config.sleep_time();

        let handles = self
            .coordinator
            .begin(&self.config.transaction_ids, self.config.round_request())?;

        let mut outcomes = Vec::with_capacity(handles.len());
        let mut unfinished = Vec::new();
        for handle in handles {
            let transaction_id = handle.transaction_id();
            match tokio::time::timeout_at(deadline, handle.outcome()).await {
                Ok(Ok(outcome)) => outcomes.push(outcome),
                Ok(Err(e)) => {
                    error!(transaction_id, error = %e, "Transaction task failed");
                    unfinished.push(transaction_id);
                }
                Err(_) => {
                    warn!(transaction_id, "Transaction still running after sleep time");
                    unfinished.push(transaction_id);
                }
            }
        }

        let committed = outcomes.iter().filter(|o| o.is_committed()).count();
        let report = RunReport {
            started_at,
            elapsed_ms: u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            committed,
            aborted: outcomes.len() - committed,
            outcomes,
            unfinished,
        };
        info!(
            committed = report.committed,
            aborted = report.aborted,
            unfinished = report.unfinished.len(),
            elapsed_ms = report.elapsed_ms,
            "Simulation finished"
        );
        Ok(report)
    }
}
