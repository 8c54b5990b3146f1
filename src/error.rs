//! Error types for the simulator
//!
//! Protocol failures (a `No` vote, a participant that times out)
//! are not errors: they are reported through the abort branch of
//! [`TransactionOutcome`](crate::two_phase_commit::TransactionOutcome).

use crate::two_phase_commit::TransactionId;
use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug)]
pub enum TwoPcError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid fault override: {0}")]
    InvalidFault(String),

    #[error("Transaction {0} is already in flight")]
    DuplicateTransaction(TransactionId),

    #[error("Transaction {transaction_id} task failed: {source}")]
    TaskFailed {
        transaction_id: TransactionId,
        #[source]
        source: JoinError,
    },

    #[error("Report serialization error: {0}")]
    Report(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TwoPcError>;
