//! Core types for delegation sync
//!
//! Share and balance amounts stay as the upstream's decimal strings. They are
//! never parsed into floating point, so equality checks are exact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Tracked account identifier (e.g. a validator operator address)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Create new account ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the identifier is empty or only whitespace
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Account known to the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: AccountId,

    /// Human readable name
    #[serde(default)]
    pub name: String,

    /// Whether delegation tracking is enabled
    #[serde(default)]
    pub enabled: bool,
}

impl Account {
    /// Create an account with tracking enabled
    pub fn enabled(id: impl Into<AccountId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
        }
    }

    /// Create an account with tracking disabled
    pub fn disabled(id: impl Into<AccountId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: false,
        }
    }
}

/// Token balance attached to a delegation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Denomination (e.g. "uatom")
    pub denom: String,
    /// Amount as a decimal string
    pub amount: String,
}

/// One counterparty's delegation against an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationRecord {
    /// Delegator address
    pub counterparty: String,
    /// Share amount as a decimal string
    pub shares: String,
    /// Balance backing the shares
    pub balance: Balance,
}

/// Upstream pagination metadata, kept opaque
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Continuation token (absent on the last page)
    pub next_key: Option<String>,
    /// Total record count, as reported upstream
    pub total: String,
}

/// Full set of delegation records for one account at one point in time
///
/// Snapshots are never mutated after capture; a newer fetch always produces
/// a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationSnapshot {
    /// Owning account
    pub account_id: AccountId,
    /// Records in upstream order
    pub records: Vec<DelegationRecord>,
    /// Pagination metadata
    pub pagination: Pagination,
    /// When the fetcher decoded this snapshot
    pub captured_at: DateTime<Utc>,
}

impl DelegationSnapshot {
    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when the account has no delegations
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-account persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    /// Account this state belongs to
    pub account_id: AccountId,
    /// Last written snapshot (absent until the first successful sync)
    pub snapshot: Option<DelegationSnapshot>,
    /// Whether tracking is enabled for the account
    pub enabled: bool,
    /// When the snapshot was last written
    pub last_written_at: Option<DateTime<Utc>>,
}

/// Counters for one sync cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleStats {
    /// Accounts whose snapshot was written
    pub succeeded: usize,
    /// Accounts with no change since the last write
    pub skipped: usize,
    /// Accounts that failed
    pub failed: usize,
    /// Records fetched across all accounts
    pub records_processed: usize,
    /// Cycle start time
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the cycle
    pub duration: Duration,
}

impl CycleStats {
    /// Zeroed stats for a cycle starting now
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            succeeded: 0,
            skipped: 0,
            failed: 0,
            records_processed: 0,
            started_at,
            duration: Duration::ZERO,
        }
    }

    /// Accounts processed in this cycle
    pub fn total(&self) -> usize {
        self.succeeded + self.skipped + self.failed
    }
}
