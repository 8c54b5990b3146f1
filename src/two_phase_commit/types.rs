//! Protocol types shared by the coordinator and participants

use crate::two_phase_commit::fault::{FaultBehavior, FaultPlan};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub type TransactionId = u64;
pub type ParticipantId = u32;

/// Answer to a prepare request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Vote {
    Yes,
    No,
}

impl fmt::Display for Vote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Vote::Yes => write!(f, "YES"),
            Vote::No => write!(f, "NO"),
        }
    }
}

/// Coordinator-side state of an in-flight transaction.
///
/// There is no committed state: a committed transaction is removed from the
/// table instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionState {
    Init,
    Prepared,
    Aborted,
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionState::Init => write!(f, "INIT"),
            TransactionState::Prepared => write!(f, "PREPARED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Token standing in for a participant's network association.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionHandle(pub u64);

/// Parameters shared by every prepare round started from one `begin` call.
#[derive(Debug, Clone)]
pub struct RoundRequest {
    pub eligible_clients: BTreeSet<ParticipantId>,
    pub participant_count: usize,
    pub timeout: Duration,
    pub faults: FaultPlan,
}

/// What a participant sees when asked to prepare.
///
/// `timeout` bounds how long the coordinator waits for the vote once the
/// participant has acknowledged the request. Delivery delay before the
/// acknowledgement does not count against it.
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub transaction_id: TransactionId,
    pub eligible_clients: Arc<BTreeSet<ParticipantId>>,
    pub participant_count: usize,
    pub timeout: Duration,
    pub fault: FaultBehavior,
    receipt: Arc<Notify>,
}

impl PrepareRequest {
    pub fn new(
        transaction_id: TransactionId,
        eligible_clients: Arc<BTreeSet<ParticipantId>>,
        participant_count: usize,
        timeout: Duration,
        fault: FaultBehavior,
    ) -> Self {
        Self {
            transaction_id,
            eligible_clients,
            participant_count,
            timeout,
            fault,
            receipt: Arc::new(Notify::new()),
        }
    }

    /// Tells the coordinator the request has arrived, which starts its
    /// vote timeout.
    pub fn acknowledge(&self) {
        self.receipt.notify_one();
    }

    pub(crate) fn receipt(&self) -> Arc<Notify> {
        Arc::clone(&self.receipt)
    }

    pub fn is_eligible(&self, participant_id: ParticipantId) -> bool {
        self.eligible_clients.contains(&participant_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// At least one participant answered `No`.
    VotedNo { participants: Vec<ParticipantId> },
    /// Some participants did not answer within the timeout.
    NoVoteReceived { participants: Vec<ParticipantId> },
    /// The transaction was aborted through [`Coordinator::abort`] while its
    /// round was still running.
    ///
    /// [`Coordinator::abort`]: crate::two_phase_commit::Coordinator::abort
    Requested,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbortReason::VotedNo { participants } => {
                write!(f, "NO vote from participant(s) {:?}", participants)
            }
            AbortReason::NoVoteReceived { participants } => {
                write!(f, "timed out waiting for participant(s) {:?}", participants)
            }
            AbortReason::Requested => write!(f, "aborted on request"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Commit,
    Abort { reason: AbortReason },
}

/// Applies the commit rule to the votes collected for one round.
///
/// Every id in `participants` must have voted `Yes` for a commit. A `No`
/// takes precedence over missing votes when both are present.
pub fn decide(participants: &[ParticipantId], votes: &BTreeMap<ParticipantId, Vote>) -> Decision {
    if participants
        .iter()
        .all(|id| votes.get(id) == Some(&Vote::Yes))
    {
        return Decision::Commit;
    }

    let voted_no: Vec<ParticipantId> = participants
        .iter()
        .copied()
        .filter(|id| votes.get(id) == Some(&Vote::No))
        .collect();
    if !voted_no.is_empty() {
        return Decision::Abort {
            reason: AbortReason::VotedNo {
                participants: voted_no,
            },
        };
    }

    let missing = participants
        .iter()
        .copied()
        .filter(|id| !votes.contains_key(id))
        .collect();
    Decision::Abort {
        reason: AbortReason::NoVoteReceived {
            participants: missing,
        },
    }
}

/// Terminal result of one transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionOutcome {
    pub transaction_id: TransactionId,
    #[serde(flatten)]
    pub decision: Decision,
    pub votes: BTreeMap<ParticipantId, Vote>,
}

impl TransactionOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self.decision, Decision::Commit)
    }

    pub fn is_aborted(&self) -> bool {
        !self.is_committed()
    }

    pub fn abort_reason(&self) -> Option<&AbortReason> {
        match &self.decision {
            Decision::Commit => None,
            Decision::Abort { reason } => Some(reason),
        }
    }
}
