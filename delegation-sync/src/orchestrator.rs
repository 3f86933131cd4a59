//! Sync cycle orchestration
//!
//! One cycle:
//!
//! 1. **Resolve**: enabled accounts from the registry (bootstrap: enable every
//!    known account when none is enabled)
//! 2. **Fan out**: one worker per account, at most `max_concurrent` in flight
//! 3. **Per account**: registry re-check → read stored state → fetch →
//!    reconcile → write if changed
//! 4. **Tally**: outcomes drained from a channel once every worker finished
//!
//! Workers never share counters. A failing account only ends its own worker.

use crate::{
    config::SyncConfig,
    context::SyncContext,
    error::{Error, ErrorKind, Result},
    fetcher::DelegationFetcher,
    metrics::{SYNC_ACCOUNTS_TOTAL, SYNC_CYCLES_TOTAL, SYNC_CYCLE_DURATION, SYNC_RECORDS_PROCESSED},
    reconciler::{ChangeReason, Reconciler},
    registry::AccountRegistry,
    store::PersistenceAdapter,
    types::{AccountId, CycleStats},
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{self, JoinSet};
use tracing::{error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Result of one account's unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    /// Changed snapshot written
    Succeeded,
    /// No change since the last write
    Skipped,
    /// Unit of work failed
    Failed {
        /// Failure class
        kind: ErrorKind,
        /// Error message
        message: String,
    },
}

impl OutcomeStatus {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            OutcomeStatus::Succeeded => "succeeded",
            OutcomeStatus::Skipped => "skipped",
            OutcomeStatus::Failed { .. } => "failed",
        }
    }
}

/// Per-account outcome reported back to the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountOutcome {
    /// Account
    pub account_id: AccountId,
    /// What happened
    pub status: OutcomeStatus,
    /// Records fetched (0 when the fetch itself failed)
    pub record_count: usize,
}

impl AccountOutcome {
    fn succeeded(account_id: AccountId, record_count: usize) -> Self {
        Self {
            account_id,
            status: OutcomeStatus::Succeeded,
            record_count,
        }
    }

    fn skipped(account_id: AccountId, record_count: usize) -> Self {
        Self {
            account_id,
            status: OutcomeStatus::Skipped,
            record_count,
        }
    }

    fn failed(account_id: AccountId, kind: ErrorKind, error: &Error, record_count: usize) -> Self {
        Self {
            account_id,
            status: OutcomeStatus::Failed {
                kind,
                message: error.to_string(),
            },
            record_count,
        }
    }
}

/// Cumulative view across cycles
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncHistory {
    /// Cycles that processed at least one account
    pub total_runs: u64,
    /// Records processed across those cycles
    pub total_records_processed: u64,
    /// Most recent cycle
    pub last: Option<CycleStats>,
    /// Failed accounts of the most recent cycle
    pub last_failures: Vec<AccountOutcome>,
}

/// Drives sync cycles
pub struct SyncOrchestrator {
    registry: Arc<dyn AccountRegistry>,
    store: Arc<dyn PersistenceAdapter>,
    fetcher: Arc<dyn DelegationFetcher>,
    config: SyncConfig,
    history: Mutex<SyncHistory>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("config", &self.config)
            .field("history", &*self.history.lock())
            .finish_non_exhaustive()
    }
}

impl SyncOrchestrator {
    /// Create new orchestrator
    pub fn new(
        registry: Arc<dyn AccountRegistry>,
        store: Arc<dyn PersistenceAdapter>,
        fetcher: Arc<dyn DelegationFetcher>,
        config: SyncConfig,
    ) -> Self {
        Self {
            registry,
            store,
            fetcher,
            config,
            history: Mutex::new(SyncHistory::default()),
        }
    }

    /// Cycle configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Stats of the most recent cycle
    pub fn last_stats(&self) -> Option<CycleStats> {
        self.history.lock().last.clone()
    }

    /// Cumulative history
    pub fn history(&self) -> SyncHistory {
        self.history.lock().clone()
    }

    /// Run one sync cycle
    ///
    /// Returns `Error::CycleIncomplete` (carrying the full stats) when any
    /// account failed.
    pub async fn run_cycle(&self, ctx: &SyncContext) -> Result<CycleStats> {
        let span = info_span!("sync_cycle", cycle_id = %Uuid::new_v4());
        self.run_cycle_inner(ctx).instrument(span).await
    }

    async fn run_cycle_inner(&self, ctx: &SyncContext) -> Result<CycleStats> {
        let started_at = Utc::now();
        let started = Instant::now();
        let mut stats = CycleStats::new(started_at);

        let accounts = self.resolve_accounts().await?;
        if accounts.is_empty() {
            info!("No accounts to sync delegations for");
            return Ok(stats);
        }

        info!(
            accounts = accounts.len(),
            max_concurrent = self.config.max_concurrent,
            "Syncing delegations"
        );

        let outcomes = self.fan_out(ctx, accounts).await;
        for outcome in &outcomes {
            tally(&mut stats, outcome);
        }
        stats.duration = started.elapsed();

        SYNC_CYCLES_TOTAL.inc();
        SYNC_CYCLE_DURATION.observe(stats.duration.as_secs_f64());
        SYNC_RECORDS_PROCESSED.inc_by(stats.records_processed as u64);

        {
            let mut history = self.history.lock();
            history.total_runs += 1;
            history.total_records_processed += stats.records_processed as u64;
            history.last = Some(stats.clone());
            history.last_failures = outcomes
                .into_iter()
                .filter(|outcome| matches!(outcome.status, OutcomeStatus::Failed { .. }))
                .collect();
        }

        info!(
            "Delegations sync completed in {:?}. Success: {}, Skipped: {}, Errors: {}, Total delegations: {}",
            stats.duration, stats.succeeded, stats.skipped, stats.failed, stats.records_processed
        );

        if stats.failed > 0 {
            return Err(Error::CycleIncomplete(Box::new(stats)));
        }

        Ok(stats)
    }

    /// Enabled accounts, or every known account when none is enabled
    async fn resolve_accounts(&self) -> Result<Vec<AccountId>> {
        let enabled = self
            .registry
            .list_enabled()
            .await
            .map_err(|e| Error::Registry(format!("failed to list enabled accounts: {}", e)))?;

        if !enabled.is_empty() {
            return Ok(enabled);
        }

        let known = self
            .registry
            .list_all()
            .await
            .map_err(|e| Error::Registry(format!("failed to list accounts: {}", e)))?;

        let mut bootstrapped = Vec::with_capacity(known.len());
        for account in known {
            match self.registry.enable_tracking(&account.id).await {
                Ok(()) => bootstrapped.push(account.id),
                Err(e) => {
                    warn!(account = %account.id, "Failed to enable tracking: {}", e);
                }
            }
        }

        if !bootstrapped.is_empty() {
            info!(
                accounts = bootstrapped.len(),
                "No enabled accounts; enabled tracking for all known accounts"
            );
        }

        Ok(bootstrapped)
    }

    /// Run every account's unit of work with bounded concurrency
    async fn fan_out(&self, ctx: &SyncContext, accounts: Vec<AccountId>) -> Vec<AccountOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent));
        // One slot per account: workers never wait on the drain below
        let (tx, mut rx) = mpsc::channel::<AccountOutcome>(accounts.len());
        let mut workers = JoinSet::new();
        let mut running: HashMap<task::Id, AccountId> = HashMap::new();
        let mut outcomes = Vec::with_capacity(accounts.len());

        let mut pending = accounts.into_iter();
        while let Some(account_id) = pending.next() {
            let permit = tokio::select! {
                biased;
                reason = ctx.done() => {
                    let err = Error::Cancelled(reason);
                    warn!("Cycle context done before all accounts were scheduled: {}", err);
                    for account_id in std::iter::once(account_id).chain(pending.by_ref()) {
                        outcomes.push(AccountOutcome::failed(account_id, err.kind(), &err, 0));
                    }
                    break;
                }
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        let err = Error::Other(format!("worker pool closed: {}", e));
                        outcomes.push(AccountOutcome::failed(account_id, ErrorKind::Internal, &err, 0));
                        continue;
                    }
                },
            };

            let registry = Arc::clone(&self.registry);
            let store = Arc::clone(&self.store);
            let fetcher = Arc::clone(&self.fetcher);
            let child = ctx.child_with_timeout(self.config.account_timeout());
            let tx = tx.clone();
            let worker_account = account_id.clone();

            let handle = workers.spawn(
                async move {
                    let outcome =
                        process_account(registry, store, fetcher, &child, account_id).await;
                    drop(permit);
                    if tx.send(outcome).await.is_err() {
                        error!("Outcome channel closed before the cycle finished");
                    }
                }
                .instrument(Span::current()),
            );
            running.insert(handle.id(), worker_account);
        }
        drop(tx);

        // A worker that never finished sends no outcome; report it here
        let mut lost = Vec::new();
        while let Some(joined) = workers.join_next_with_id().await {
            match joined {
                Ok((id, ())) => {
                    running.remove(&id);
                }
                Err(e) => {
                    let account_id = running
                        .remove(&e.id())
                        .unwrap_or_else(|| AccountId::new("<unknown>"));
                    error!(account = %account_id, "Account worker failed: {}", e);
                    lost.push((account_id, e.to_string()));
                }
            }
        }

        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }

        for (account_id, reason) in lost {
            let err = Error::Other(format!("account worker failed: {}", reason));
            outcomes.push(AccountOutcome::failed(account_id, ErrorKind::Internal, &err, 0));
        }

        outcomes
    }
}

/// One account: registry re-check, read, fetch, reconcile, write
async fn process_account(
    registry: Arc<dyn AccountRegistry>,
    store: Arc<dyn PersistenceAdapter>,
    fetcher: Arc<dyn DelegationFetcher>,
    ctx: &SyncContext,
    account_id: AccountId,
) -> AccountOutcome {
    // Every collaborator call runs under the per-account deadline
    if let Err(e) = ctx.run(registry.get_by_id(&account_id)).await.and_then(|found| found) {
        let kind = match e {
            Error::NotFound(_) => ErrorKind::AccountNotFound,
            ref other => other.kind(),
        };
        warn!(account = %account_id, "Registry re-check failed: {}", e);
        return AccountOutcome::failed(account_id, kind, &e, 0);
    }

    let stored = match ctx.run(store.read_state(&account_id)).await {
        Ok(Ok(stored)) => stored,
        Err(e) => {
            warn!(account = %account_id, "Reading stored state interrupted: {}", e);
            return AccountOutcome::failed(account_id, e.kind(), &e, 0);
        }
        Ok(Err(e)) => {
            warn!(
                account = %account_id,
                "Failed to read stored state, treating as absent: {}",
                e
            );
            None
        }
    };

    let fresh = match fetcher.fetch(ctx, &account_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(account = %account_id, "Error retrieving delegations: {}", e);
            return AccountOutcome::failed(account_id, e.kind(), &e, 0);
        }
    };

    let record_count = fresh.records.len();
    let previous = stored.as_ref().and_then(|state| state.snapshot.as_ref());
    let decision = Reconciler::decide(previous, &fresh);

    if !decision.changed {
        info!(
            account = %account_id,
            "No changes - skipped updating {} delegations",
            record_count
        );
        return AccountOutcome::skipped(account_id, record_count);
    }

    if let Err(e) = ctx.run(store.write(&account_id, fresh)).await.and_then(|written| written) {
        error!(account = %account_id, "Error saving delegations: {}", e);
        let kind = match e {
            Error::Cancelled(_) => ErrorKind::Cancelled,
            _ => ErrorKind::PersistenceFailure,
        };
        return AccountOutcome::failed(account_id, kind, &e, record_count);
    }

    match decision.reason {
        Some(ChangeReason::FirstSnapshot) => {
            info!(account = %account_id, "Initial sync of {} delegations", record_count)
        }
        reason => info!(
            account = %account_id,
            reason = ?reason,
            "Updated {} delegations",
            record_count
        ),
    }

    AccountOutcome::succeeded(account_id, record_count)
}

fn tally(stats: &mut CycleStats, outcome: &AccountOutcome) {
    match outcome.status {
        OutcomeStatus::Succeeded => stats.succeeded += 1,
        OutcomeStatus::Skipped => stats.skipped += 1,
        OutcomeStatus::Failed { .. } => stats.failed += 1,
    }
    stats.records_processed += outcome.record_count;

    SYNC_ACCOUNTS_TOTAL
        .with_label_values(&[outcome.status.label()])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::InMemoryRegistry;
    use crate::store::InMemoryStore;
    use crate::types::{Account, DelegationSnapshot, Pagination};
    use async_trait::async_trait;

    /// Fetcher that panics for one account
    struct PanicsOn(&'static str);

    #[async_trait]
    impl DelegationFetcher for PanicsOn {
        async fn fetch(
            &self,
            _ctx: &SyncContext,
            account_id: &AccountId,
        ) -> Result<DelegationSnapshot> {
            if account_id.as_str() == self.0 {
                panic!("decoder blew up for {}", account_id);
            }
            Ok(DelegationSnapshot {
                account_id: account_id.clone(),
                records: Vec::new(),
                pagination: Pagination::default(),
                captured_at: Utc::now(),
            })
        }
    }

    #[tokio::test]
    async fn test_panicking_worker_reported_against_its_account() {
        let registry = InMemoryRegistry::with_accounts(vec![
            Account::enabled("val-a", "Alpha"),
            Account::enabled("val-b", "Beta"),
        ]);
        let orchestrator = SyncOrchestrator::new(
            Arc::new(registry),
            Arc::new(InMemoryStore::new()),
            Arc::new(PanicsOn("val-b")),
            SyncConfig::default(),
        );

        let err = orchestrator
            .run_cycle(&SyncContext::background())
            .await
            .unwrap_err();
        let stats = err.cycle_stats().unwrap();
        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 1);

        let failures = orchestrator.history().last_failures;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].account_id, AccountId::new("val-b"));
        match &failures[0].status {
            OutcomeStatus::Failed { kind, message } => {
                assert_eq!(*kind, ErrorKind::Internal);
                assert!(message.contains("panic"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_tally_counts_each_status() {
        let mut stats = CycleStats::new(Utc::now());
        let err = Error::Persistence("disk full".into());

        tally(&mut stats, &AccountOutcome::succeeded(AccountId::new("a"), 3));
        tally(&mut stats, &AccountOutcome::skipped(AccountId::new("b"), 2));
        tally(
            &mut stats,
            &AccountOutcome::failed(AccountId::new("c"), ErrorKind::PersistenceFailure, &err, 4),
        );

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.records_processed, 9);
    }

    #[test]
    fn test_failed_outcome_carries_message() {
        let err = Error::NotFound("account val-x".into());
        let outcome =
            AccountOutcome::failed(AccountId::new("val-x"), ErrorKind::AccountNotFound, &err, 0);

        match &outcome.status {
            OutcomeStatus::Failed { kind, message } => {
                assert_eq!(*kind, ErrorKind::AccountNotFound);
                assert!(message.contains("val-x"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(outcome.status.label(), "failed");
    }
}
