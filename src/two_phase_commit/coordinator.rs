//! Transaction coordinator
//!
//! Each transaction runs its own prepare round on a separate tokio task. A
//! round asks every registered participant to prepare, one after another.
//! Each vote is awaited for at most the round timeout, counted from the
//! moment the participant acknowledges the request, and the round decides
//! as soon as the last participant has answered or timed out.

use crate::config::Timing;
use crate::error::{Result, TwoPcError};
use crate::two_phase_commit::table::TransactionTable;
use crate::two_phase_commit::traits::Participant;
use crate::two_phase_commit::types::{
    decide, AbortReason, Decision, ParticipantId, PrepareRequest, RoundRequest, TransactionId,
    TransactionOutcome, TransactionState, Vote,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Registry = BTreeMap<ParticipantId, Arc<dyn Participant>>;

/// Completion handle for one transaction started by [`Coordinator::begin`].
pub struct TransactionHandle {
    transaction_id: TransactionId,
    task: JoinHandle<TransactionOutcome>,
}

impl TransactionHandle {
    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the transaction to reach its terminal outcome.
    pub async fn outcome(self) -> Result<TransactionOutcome> {
        let transaction_id = self.transaction_id;
        self.task
            .await
            .map_err(|source| TwoPcError::TaskFailed {
                transaction_id,
                source,
            })
    }
}

#[derive(Clone)]
pub struct Coordinator {
    participants: Arc<RwLock<Registry>>,
    transactions: Arc<TransactionTable>,
    timing: Timing,
}

impl Coordinator {
    pub fn new(timing: Timing) -> Self {
        Self {
            participants: Arc::new(RwLock::new(BTreeMap::new())),
            transactions: Arc::new(TransactionTable::new()),
            timing,
        }
    }

    /// Adds a participant. A later registration under the same id replaces
    /// the earlier one.
    pub fn register(&self, participant_id: ParticipantId, participant: Arc<dyn Participant>) {
        let reported = participant.id();
        if reported != participant_id {
            warn!(
                participant_id,
                reported, "Participant registered under a different id than it reports"
            );
        }
        if self
            .participants
            .write()
            .insert(participant_id, participant)
            .is_some()
        {
            debug!(participant_id, "Replaced registered participant");
        }
    }

    pub fn participant_ids(&self) -> Vec<ParticipantId> {
        self.participants.read().keys().copied().collect()
    }

    pub fn state(&self, transaction_id: TransactionId) -> Option<TransactionState> {
        self.transactions.get(transaction_id)
    }

    /// Transactions that have not reached a terminal outcome yet.
    pub fn in_flight(&self) -> Vec<TransactionId> {
        self.transactions.ids()
    }

    pub fn is_idle(&self) -> bool {
        self.transactions.is_empty()
    }

    fn registry_snapshot(&self) -> Vec<(ParticipantId, Arc<dyn Participant>)> {
        self.participants
            .read()
            .iter()
            .map(|(id, p)| (*id, Arc::clone(p)))
            .collect()
    }

    /// Starts one prepare round per transaction id and returns immediately.
    ///
    /// Fails without starting anything if an id is repeated or already in
    /// flight. Must be called from within a tokio runtime.
    pub fn begin(
        &self,
        transaction_ids: &[TransactionId],
        request: RoundRequest,
    ) -> Result<Vec<TransactionHandle>> {
        if let Some(dup) = self.transactions.insert_all(transaction_ids) {
            return Err(TwoPcError::DuplicateTransaction(dup));
        }

        let request = Arc::new(request);
        let handles = transaction_ids
            .iter()
            .map(|&transaction_id| {
                info!(transaction_id, "Starting transaction");
                let coordinator = self.clone();
                let request = Arc::clone(&request);
                TransactionHandle {
                    transaction_id,
                    task: tokio::spawn(coordinator.run_prepare_round(transaction_id, request)),
                }
            })
            .collect();
        Ok(handles)
    }

    async fn run_prepare_round(
        self,
        transaction_id: TransactionId,
        request: Arc<RoundRequest>,
    ) -> TransactionOutcome {
        info!(transaction_id, "Coordinator sending prepare message");

        let participants = self.registry_snapshot();
        let expected: Vec<ParticipantId> = participants.iter().map(|(id, _)| *id).collect();
        let votes = self
            .collect_votes(transaction_id, &participants, &request)
            .await;

        let decision = if self.transactions.get(transaction_id).is_none() {
            Decision::Abort {
                reason: AbortReason::Requested,
            }
        } else {
            decide(&expected, &votes)
        };

        let decision = match decision {
            Decision::Commit if self.transactions.claim_commit(transaction_id) => {
                info!(
                    transaction_id,
                    "Coordinator received all prepare responses, sending commit message"
                );
                self.commit(transaction_id).await;
                Decision::Commit
            }
            Decision::Commit => {
                warn!(transaction_id, "Transaction aborted before it could commit");
                Decision::Abort {
                    reason: AbortReason::Requested,
                }
            }
            Decision::Abort { reason } => {
                warn!(transaction_id, %reason, "Coordinator aborting transaction");
                self.abort(transaction_id).await;
                Decision::Abort { reason }
            }
        };

        TransactionOutcome {
            transaction_id,
            decision,
            votes,
        }
    }

    /// Sends prepare to each participant in turn and folds every vote that
    /// arrives in time into the table. Stops early if the transaction is
    /// aborted from outside the round.
    async fn collect_votes(
        &self,
        transaction_id: TransactionId,
        participants: &[(ParticipantId, Arc<dyn Participant>)],
        request: &RoundRequest,
    ) -> BTreeMap<ParticipantId, Vote> {
        let eligible_clients = Arc::new(request.eligible_clients.clone());
        let mut votes = BTreeMap::new();

        for (participant_id, participant) in participants {
            if self.transactions.get(transaction_id).is_none() {
                debug!(transaction_id, "Transaction no longer in flight, stopping prepare round");
                break;
            }

            let prepare = PrepareRequest::new(
                transaction_id,
                Arc::clone(&eligible_clients),
                request.participant_count,
                request.timeout,
                request.faults.behavior_for(*participant_id),
            );
            match await_vote(participant.as_ref(), &prepare, self.timing.max_jitter()).await {
                Some(vote) => {
                    self.transactions.record_vote(transaction_id, vote);
                    votes.insert(*participant_id, vote);
                }
                None => warn!(
                    transaction_id,
                    participant_id = *participant_id,
                    timeout = ?request.timeout,
                    "Coordinator timed out waiting for prepare response"
                ),
            }
        }

        votes
    }

    /// Second phase, success path.
    ///
    /// All participants are told to commit before any of them is waited on.
    /// The transaction's entry is removed, then the coordinator pauses for
    /// the simulated durable write.
    pub async fn commit(&self, transaction_id: TransactionId) {
        info!(transaction_id, "Coordinator sending commit message");
        let participants = self.registry_snapshot();

        for (_, participant) in &participants {
            participant.receive_commit(transaction_id).await;
        }
        info!(transaction_id, "Transaction committed");

        for (_, participant) in &participants {
            participant.wait_commit_finish(transaction_id).await;
        }

        self.transactions.remove(transaction_id);
        tokio::time::sleep(self.timing.commit_flush()).await;
    }

    /// Second phase, failure path.
    ///
    /// The transaction's entry is claimed before anyone is notified, so
    /// concurrent calls notify each participant once. Returns `false`
    /// without notifying anyone when the transaction is not in flight or its
    /// round has already decided to commit.
    pub async fn abort(&self, transaction_id: TransactionId) -> bool {
        if self.transactions.claim_abort(transaction_id).is_none() {
            debug!(transaction_id, "Abort ignored, transaction not in flight or committing");
            return false;
        }

        info!(transaction_id, "Transaction aborted");
        for (_, participant) in self.registry_snapshot() {
            participant.abort_transaction(transaction_id).await;
        }
        true
    }
}

/// Waits for one participant's vote.
///
/// The timeout starts when the participant acknowledges the request, so
/// delivery jitter never costs a vote. A participant that answers without
/// acknowledging is bounded by `delivery + timeout` overall. A call that runs
/// past its bound is dropped and yields `None`.
async fn await_vote(
    participant: &dyn Participant,
    prepare: &PrepareRequest,
    delivery: Duration,
) -> Option<Vote> {
    let receipt = prepare.receipt();
    let call = participant.receive_prepare(prepare);
    tokio::pin!(call);

    let acknowledged = tokio::select! {
        biased;
        vote = &mut call => return Some(vote),
        _ = receipt.notified() => true,
        _ = tokio::time::sleep(delivery + prepare.timeout) => false,
    };
    if !acknowledged {
        return None;
    }
    tokio::time::timeout(prepare.timeout, call).await.ok()
}
