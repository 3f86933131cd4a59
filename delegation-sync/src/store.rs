//! Persistence adapter interface
//!
//! The adapter owns `StoredState`. The sync engine reads it for comparison
//! and requests writes; it never edits stored fields directly.

use crate::error::Result;
use crate::types::{AccountId, DelegationSnapshot, StoredState};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistence adapter trait
///
/// Implementations must tolerate concurrent writes for different accounts.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    /// Current state for an account; `None` when nothing is stored
    async fn read_state(&self, account_id: &AccountId) -> Result<Option<StoredState>>;

    /// Upsert the latest snapshot for an account
    async fn write(&self, account_id: &AccountId, snapshot: DelegationSnapshot) -> Result<()>;

    /// Every stored account state
    async fn list_states(&self) -> Result<Vec<StoredState>>;
}

/// Store held in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    states: RwLock<HashMap<AccountId, StoredState>>,
}

impl InMemoryStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of accounts with stored state
    pub fn len(&self) -> usize {
        self.states.read().len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.states.read().is_empty()
    }

    /// Mark tracking state without touching the snapshot
    pub fn set_enabled(&self, account_id: &AccountId, enabled: bool) {
        let mut states = self.states.write();
        states
            .entry(account_id.clone())
            .and_modify(|state| state.enabled = enabled)
            .or_insert_with(|| StoredState {
                account_id: account_id.clone(),
                snapshot: None,
                enabled,
                last_written_at: None,
            });
    }
}

#[async_trait]
impl PersistenceAdapter for InMemoryStore {
    async fn read_state(&self, account_id: &AccountId) -> Result<Option<StoredState>> {
        Ok(self.states.read().get(account_id).cloned())
    }

    async fn write(&self, account_id: &AccountId, snapshot: DelegationSnapshot) -> Result<()> {
        let mut states = self.states.write();
        let state = states
            .entry(account_id.clone())
            .or_insert_with(|| StoredState {
                account_id: account_id.clone(),
                snapshot: None,
                enabled: true,
                last_written_at: None,
            });

        state.last_written_at = Some(snapshot.captured_at);
        state.snapshot = Some(snapshot);
        Ok(())
    }

    async fn list_states(&self) -> Result<Vec<StoredState>> {
        let mut states: Vec<StoredState> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.account_id.cmp(&b.account_id));
        Ok(states)
    }
}
