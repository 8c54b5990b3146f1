//! Participant trait definition

use crate::two_phase_commit::types::{
    ConnectionHandle, ParticipantId, PrepareRequest, TransactionId, Vote,
};
use async_trait::async_trait;

/// A resource manager taking part in two-phase commit.
///
/// The coordinator only talks to participants through this trait, and learns
/// about their state only through the returned [`Vote`].
#[async_trait]
pub trait Participant: Send + Sync {
    fn id(&self) -> ParticipantId;

    /// Record the connection token used to reach this participant.
    fn connect(&self, handle: ConnectionHandle);

    /// Phase one: answer whether this participant can commit.
    async fn receive_prepare(&self, request: &PrepareRequest) -> Vote;

    /// Phase two, success path.
    async fn receive_commit(&self, transaction_id: TransactionId);

    /// Called after every participant has been told to commit. Returns once
    /// this participant's commit work is finished.
    async fn wait_commit_finish(&self, transaction_id: TransactionId);

    /// Phase two, failure path.
    async fn abort_transaction(&self, transaction_id: TransactionId);
}
