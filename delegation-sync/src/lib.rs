//! Delegation Sync
//!
//! Periodically pulls delegation records for a set of tracked accounts from an
//! upstream read-only API, reconciles them against the last persisted snapshot,
//! and writes only genuine changes.
//!
//! # Architecture
//!
//! ```text
//!            ┌──────────────────────┐
//!  trigger ─▶│   SyncOrchestrator   │◀── AccountRegistry
//!            └──────────┬───────────┘
//!                       │  bounded fan-out (semaphore)
//!         ┌─────────────┼─────────────┐
//!     ┌───▼───┐     ┌───▼───┐     ┌───▼───┐
//!     │worker │     │worker │     │worker │   fetch → decide → write
//!     └───┬───┘     └───┬───┘     └───┬───┘
//!         └─────────────┼─────────────┘
//!                       ▼
//!              outcome channel → CycleStats
//! ```
//!
//! # Invariants
//!
//! - At most `max_concurrent` upstream fetches are in flight per cycle
//! - One account's failure never cancels or blocks another account's work
//! - Each account is handled by exactly one worker per cycle, so the store
//!   never sees two concurrent writes for the same key
//! - Cycle statistics are tallied by a single consumer after all workers finish

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod metrics;
pub mod orchestrator;
pub mod reconciler;
pub mod registry;
pub mod store;
pub mod types;

// Re-exports
pub use config::{Config, FetcherConfig, SyncConfig};
pub use context::{CancelReason, SyncContext};
pub use error::{Error, ErrorKind, Result};
pub use fetcher::{DelegationFetcher, RemoteFetcher};
pub use orchestrator::{AccountOutcome, OutcomeStatus, SyncHistory, SyncOrchestrator};
pub use reconciler::{ChangeReason, ReconcileResult, Reconciler};
pub use registry::{AccountRegistry, InMemoryRegistry};
pub use store::{InMemoryStore, PersistenceAdapter};
pub use types::{
    Account, AccountId, Balance, CycleStats, DelegationRecord, DelegationSnapshot, Pagination,
    StoredState,
};
