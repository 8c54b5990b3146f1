//! Coordinator-owned transaction state table

use crate::two_phase_commit::{TransactionId, TransactionState, Vote};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: TransactionState,
    /// Set once the round has decided to commit. Aborts are refused from
    /// then on.
    committing: bool,
}

/// One mutex around the whole map. Entries only live while a transaction is
/// in flight, so contention stays low.
#[derive(Debug, Default)]
pub struct TransactionTable {
    entries: Mutex<HashMap<TransactionId, Entry>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts every id as `Init`, or none of them if any is already present.
    /// Returns the first conflicting id.
    pub fn insert_all(&self, ids: &[TransactionId]) -> Option<TransactionId> {
        let mut entries = self.entries.lock();
        let mut seen = HashSet::new();
        if let Some(dup) = ids
            .iter()
            .find(|id| entries.contains_key(*id) || !seen.insert(**id))
        {
            return Some(*dup);
        }
        for id in ids {
            entries.insert(
                *id,
                Entry {
                    state: TransactionState::Init,
                    committing: false,
                },
            );
        }
        None
    }

    /// Folds a participant's vote into the transaction's state. An abort is
    /// sticky. Votes for unknown transactions are ignored.
    pub fn record_vote(&self, id: TransactionId, vote: Vote) -> Option<TransactionState> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(&id)?;
        entry.state = match (vote, entry.state) {
            (Vote::No, _) | (_, TransactionState::Aborted) => TransactionState::Aborted,
            (Vote::Yes, _) => TransactionState::Prepared,
        };
        Some(entry.state)
    }

    /// Marks the transaction as committing. Fails if it is no longer in
    /// flight or a commit was already claimed.
    pub fn claim_commit(&self, id: TransactionId) -> bool {
        match self.entries.lock().get_mut(&id) {
            Some(entry) if !entry.committing => {
                entry.committing = true;
                true
            }
            _ => false,
        }
    }

    /// Removes the transaction so that exactly one caller gets to abort it.
    /// Returns `None` if it is unknown or already committing.
    pub fn claim_abort(&self, id: TransactionId) -> Option<TransactionState> {
        let mut entries = self.entries.lock();
        if entries.get(&id).map_or(true, |e| e.committing) {
            return None;
        }
        entries.remove(&id).map(|e| e.state)
    }

    pub fn get(&self, id: TransactionId) -> Option<TransactionState> {
        self.entries.lock().get(&id).map(|e| e.state)
    }

    pub fn remove(&self, id: TransactionId) -> Option<TransactionState> {
        self.entries.lock().remove(&id).map(|e| e.state)
    }

    pub fn ids(&self) -> Vec<TransactionId> {
        let mut ids: Vec<_> = self.entries.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
