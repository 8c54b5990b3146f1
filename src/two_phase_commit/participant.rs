//! Simulated participant with injectable failures

use crate::config::Timing;
use crate::two_phase_commit::chance::Chance;
use crate::two_phase_commit::fault::FaultBehavior;
use crate::two_phase_commit::traits::Participant;
use crate::two_phase_commit::types::{
    ConnectionHandle, ParticipantId, PrepareRequest, TransactionId, Vote,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What this participant remembers about a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalState {
    Prepared,
    Committed,
    Aborted,
}

pub struct SimulatedParticipant {
    id: ParticipantId,
    timing: Timing,
    chance: Arc<dyn Chance>,
    connection: Mutex<Option<ConnectionHandle>>,
    /// One entry per transaction this participant has seen. Entries are kept
    /// after the outcome so a late prepare for an aborted transaction is
    /// refused; a run only ever sees its configured transaction ids.
    ledger: RwLock<HashMap<TransactionId, LocalState>>,
}

impl SimulatedParticipant {
    pub fn new(id: ParticipantId, timing: Timing, chance: Arc<dyn Chance>) -> Self {
        Self {
            id,
            timing,
            chance,
            connection: Mutex::new(None),
            ledger: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connection.lock().is_some()
    }

    pub fn connection(&self) -> Option<ConnectionHandle> {
        *self.connection.lock()
    }

    pub fn local_state(&self, transaction_id: TransactionId) -> Option<LocalState> {
        self.ledger.read().get(&transaction_id).copied()
    }

    pub fn known_transactions(&self) -> usize {
        self.ledger.read().len()
    }

    async fn simulate_jitter(&self) {
        let units = self.chance.jitter_units(self.timing.max_jitter_units);
        if units > 0 {
            tokio::time::sleep(self.timing.units(units)).await;
        }
    }

    fn choose_vote(&self, request: &PrepareRequest) -> Vote {
        if self.local_state(request.transaction_id) == Some(LocalState::Aborted) {
            info!(
                participant_id = self.id,
                transaction_id = request.transaction_id,
                "Participant already aborted this transaction"
            );
            return Vote::No;
        }

        if request.fault == FaultBehavior::RefuseBeforePrepare {
            warn!(
                participant_id = self.id,
                transaction_id = request.transaction_id,
                "Participant failing before responding to prepare message"
            );
            return Vote::No;
        }

        if request.is_eligible(self.id) && self.chance.prepare_succeeds() {
            Vote::Yes
        } else {
            Vote::No
        }
    }
}

#[async_trait]
impl Participant for SimulatedParticipant {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn connect(&self, handle: ConnectionHandle) {
        *self.connection.lock() = Some(handle);
    }

    async fn receive_prepare(&self, request: &PrepareRequest) -> Vote {
        self.simulate_jitter().await;
        request.acknowledge();
        info!(
            participant_id = self.id,
            transaction_id = request.transaction_id,
            clients = ?request.eligible_clients,
            "Participant received prepare message"
        );

        let vote = self.choose_vote(request);
        {
            let mut ledger = self.ledger.write();
            let state = match vote {
                Vote::Yes => LocalState::Prepared,
                Vote::No => LocalState::Aborted,
            };
            ledger.insert(request.transaction_id, state);
        }
        info!(
            participant_id = self.id,
            transaction_id = request.transaction_id,
            %vote,
            "Participant responding"
        );

        if vote == Vote::Yes && request.fault == FaultBehavior::StallAfterYes {
            warn!(
                participant_id = self.id,
                transaction_id = request.transaction_id,
                "Participant failing after replying YES"
            );
            tokio::time::sleep(request.timeout + self.timing.time_unit).await;
        }

        vote
    }

    async fn receive_commit(&self, transaction_id: TransactionId) {
        self.simulate_jitter().await;
        info!(
            participant_id = self.id,
            transaction_id, "Participant received commit message"
        );

        let mut ledger = self.ledger.write();
        match ledger.get_mut(&transaction_id) {
            Some(state) if *state == LocalState::Prepared => {
                *state = LocalState::Committed;
                info!(
                    participant_id = self.id,
                    transaction_id, "Participant committing transaction"
                );
            }
            other => {
                warn!(
                    participant_id = self.id,
                    transaction_id,
                    local_state = ?other,
                    "Participant received unexpected commit message"
                );
            }
        }
    }

    async fn wait_commit_finish(&self, transaction_id: TransactionId) {
        debug!(
            participant_id = self.id,
            transaction_id, "Participant commit work finished"
        );
    }

    async fn abort_transaction(&self, transaction_id: TransactionId) {
        self.ledger
            .write()
            .insert(transaction_id, LocalState::Aborted);

        if let Some(handle) = self.connection.lock().take() {
            info!(
                participant_id = self.id,
                transaction_id,
                connection = handle.0,
                "Participant closing connection"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::two_phase_commit::chance::FixedChance;
    use std::collections::BTreeSet;
    use std::time::Duration;

    fn timing() -> Timing {
        Timing::from_millis(5)
    }

    fn request(transaction_id: TransactionId, eligible: &[ParticipantId], fault: FaultBehavior) -> PrepareRequest {
        PrepareRequest::new(
            transaction_id,
            Arc::new(eligible.iter().copied().collect::<BTreeSet<_>>()),
            2,
            Duration::from_millis(10),
            fault,
        )
    }

    #[tokio::test]
    async fn test_eligible_participant_votes_yes() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        let vote = p.receive_prepare(&request(1, &[1, 2], FaultBehavior::None)).await;
        assert_eq!(vote, Vote::Yes);
        assert_eq!(p.local_state(1), Some(LocalState::Prepared));
    }

    #[tokio::test]
    async fn test_ineligible_or_unlucky_participant_votes_no() {
        let p = SimulatedParticipant::new(2, timing(), Arc::new(FixedChance::always()));
        assert_eq!(p.receive_prepare(&request(1, &[1], FaultBehavior::None)).await, Vote::No);

        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::never()));
        assert_eq!(p.receive_prepare(&request(1, &[1], FaultBehavior::None)).await, Vote::No);
        assert_eq!(p.local_state(1), Some(LocalState::Aborted));
    }

    #[tokio::test]
    async fn test_refuse_before_prepare() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        let vote = p
            .receive_prepare(&request(1, &[1], FaultBehavior::RefuseBeforePrepare))
            .await;
        assert_eq!(vote, Vote::No);
    }

    #[tokio::test]
    async fn test_stall_after_yes_outlasts_timeout() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        let req = request(1, &[1], FaultBehavior::StallAfterYes);
        let start = tokio::time::Instant::now();
        let vote = p.receive_prepare(&req).await;
        assert_eq!(vote, Vote::Yes);
        assert!(start.elapsed() > req.timeout);
    }

    #[tokio::test]
    async fn test_commit_and_abort_hooks() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        p.connect(ConnectionHandle(1));
        p.receive_prepare(&request(1, &[1], FaultBehavior::None)).await;
        p.receive_commit(1).await;
        assert_eq!(p.local_state(1), Some(LocalState::Committed));

        // Commit without a prepare only logs.
        p.receive_commit(2).await;
        assert_eq!(p.local_state(2), None);

        p.abort_transaction(3).await;
        assert!(!p.is_connected());
        p.abort_transaction(3).await;
        assert_eq!(p.local_state(3), Some(LocalState::Aborted));
    }

    #[tokio::test]
    async fn test_prepare_after_abort_votes_no() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        p.abort_transaction(4).await;
        assert_eq!(p.receive_prepare(&request(4, &[1], FaultBehavior::None)).await, Vote::No);
    }

    #[tokio::test]
    async fn test_prepare_acknowledged_after_jitter() {
        let p = SimulatedParticipant::new(
            1,
            timing(),
            Arc::new(FixedChance::always().with_max_jitter()),
        );
        let req = request(1, &[1], FaultBehavior::None);
        let receipt = req.receipt();

        let start = tokio::time::Instant::now();
        let (vote, ()) = tokio::join!(p.receive_prepare(&req), receipt.notified());
        assert_eq!(vote, Vote::Yes);
        assert!(start.elapsed() >= timing().max_jitter());
    }

    #[tokio::test]
    async fn test_ledger_holds_one_entry_per_transaction() {
        let p = SimulatedParticipant::new(1, timing(), Arc::new(FixedChance::always()));
        for id in 1..=3 {
            p.receive_prepare(&request(id, &[1], FaultBehavior::None)).await;
            p.receive_commit(id).await;
        }
        p.receive_prepare(&request(2, &[1], FaultBehavior::None)).await;
        p.abort_transaction(3).await;
        assert_eq!(p.known_transactions(), 3);
        assert_eq!(p.local_state(1), Some(LocalState::Committed));
        assert_eq!(p.local_state(3), Some(LocalState::Aborted));
    }
}
