//! Change detection between stored and freshly fetched snapshots
//!
//! Used to skip redundant writes. Writing unconditionally would also be
//! correct, so a false "changed" only costs a write.

use crate::types::{DelegationRecord, DelegationSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Why a snapshot counts as changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeReason {
    /// Nothing stored yet for this account
    FirstSnapshot,
    /// Record count differs
    RecordCount {
        /// Stored count
        previous: usize,
        /// Fetched count
        fresh: usize,
    },
    /// Pagination total or continuation token differs
    Pagination,
    /// Counterparty not present in the stored snapshot
    NewCounterparty(String),
    /// Shares or balance differ for a known counterparty
    RecordChanged(String),
}

/// Outcome of a reconcile decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileResult {
    /// Whether a write is needed
    pub changed: bool,
    /// First difference found
    pub reason: Option<ChangeReason>,
}

impl ReconcileResult {
    fn changed(reason: ChangeReason) -> Self {
        Self {
            changed: true,
            reason: Some(reason),
        }
    }

    fn unchanged() -> Self {
        Self {
            changed: false,
            reason: None,
        }
    }
}

/// Snapshot reconciler
#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    /// Decide whether `fresh` differs from `previous`
    ///
    /// Capture timestamps are ignored. Record order is ignored.
    pub fn decide(
        previous: Option<&DelegationSnapshot>,
        fresh: &DelegationSnapshot,
    ) -> ReconcileResult {
        let previous = match previous {
            Some(previous) => previous,
            None => return ReconcileResult::changed(ChangeReason::FirstSnapshot),
        };

        if previous.records.len() != fresh.records.len() {
            return ReconcileResult::changed(ChangeReason::RecordCount {
                previous: previous.records.len(),
                fresh: fresh.records.len(),
            });
        }

        if previous.pagination.total != fresh.pagination.total
            || previous.pagination.next_key != fresh.pagination.next_key
        {
            return ReconcileResult::changed(ChangeReason::Pagination);
        }

        // Last write wins on duplicate counterparties
        let known: HashMap<&str, &DelegationRecord> = previous
            .records
            .iter()
            .map(|record| (record.counterparty.as_str(), record))
            .collect();

        for record in &fresh.records {
            match known.get(record.counterparty.as_str()) {
                None => {
                    return ReconcileResult::changed(ChangeReason::NewCounterparty(
                        record.counterparty.clone(),
                    ))
                }
                Some(stored) if *stored != record => {
                    return ReconcileResult::changed(ChangeReason::RecordChanged(
                        record.counterparty.clone(),
                    ))
                }
                Some(_) => {}
            }
        }

        ReconcileResult::unchanged()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountId, Balance, Pagination};
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn record(counterparty: &str, shares: &str) -> DelegationRecord {
        DelegationRecord {
            counterparty: counterparty.to_string(),
            shares: shares.to_string(),
            balance: Balance {
                denom: "uatom".to_string(),
                amount: shares.split('.').next().unwrap_or("0").to_string(),
            },
        }
    }

    fn snapshot(records: Vec<DelegationRecord>) -> DelegationSnapshot {
        DelegationSnapshot {
            account_id: AccountId::new("cosmosvaloper1test"),
            pagination: Pagination {
                next_key: None,
                total: records.len().to_string(),
            },
            records,
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_first_snapshot_is_change() {
        let fresh = snapshot(vec![record("d1", "100")]);
        let result = Reconciler::decide(None, &fresh);
        assert!(result.changed);
        assert_eq!(result.reason, Some(ChangeReason::FirstSnapshot));
    }

    #[test]
    fn test_identical_snapshot_is_unchanged() {
        let previous = snapshot(vec![record("d1", "100"), record("d2", "250.5")]);
        let mut fresh = previous.clone();
        fresh.captured_at = previous.captured_at + Duration::hours(1);

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert!(!result.changed);
        assert_eq!(result.reason, None);
    }

    #[test]
    fn test_share_change_detected() {
        let previous = snapshot(vec![record("d1", "100")]);
        let fresh = snapshot(vec![record("d1", "101")]);

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert!(result.changed);
        assert_eq!(result.reason, Some(ChangeReason::RecordChanged("d1".into())));
    }

    #[test]
    fn test_high_precision_shares_compared_exactly() {
        let previous = snapshot(vec![record("d1", "1000000.000000000000000001")]);
        let fresh = snapshot(vec![record("d1", "1000000.000000000000000002")]);

        assert!(Reconciler::decide(Some(&previous), &fresh).changed);
    }

    #[test]
    fn test_balance_change_detected() {
        let previous = snapshot(vec![record("d1", "100")]);
        let mut fresh = previous.clone();
        fresh.records[0].balance.amount = "99".to_string();

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert_eq!(result.reason, Some(ChangeReason::RecordChanged("d1".into())));
    }

    #[test]
    fn test_removed_record_detected() {
        let previous = snapshot(vec![record("d1", "100"), record("d2", "200")]);
        let fresh = snapshot(vec![record("d1", "100")]);

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert!(result.changed);
        assert_eq!(
            result.reason,
            Some(ChangeReason::RecordCount {
                previous: 2,
                fresh: 1
            })
        );
    }

    #[test]
    fn test_replaced_counterparty_detected() {
        let previous = snapshot(vec![record("d1", "100"), record("d2", "200")]);
        let fresh = snapshot(vec![record("d1", "100"), record("d3", "200")]);

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert_eq!(result.reason, Some(ChangeReason::NewCounterparty("d3".into())));
    }

    #[test]
    fn test_pagination_change_detected() {
        let previous = snapshot(vec![record("d1", "100")]);
        let mut fresh = previous.clone();
        fresh.pagination.next_key = Some("AoMBZA==".to_string());

        let result = Reconciler::decide(Some(&previous), &fresh);
        assert_eq!(result.reason, Some(ChangeReason::Pagination));

        let mut fresh = previous.clone();
        fresh.pagination.total = "2".to_string();
        assert_eq!(
            Reconciler::decide(Some(&previous), &fresh).reason,
            Some(ChangeReason::Pagination)
        );
    }

    #[test]
    fn test_duplicate_counterparty_last_write_wins() {
        let previous = snapshot(vec![record("d1", "100"), record("d1", "150")]);
        let fresh = snapshot(vec![record("d1", "150"), record("d1", "150")]);

        assert!(!Reconciler::decide(Some(&previous), &fresh).changed);
    }

    fn record_strategy() -> impl Strategy<Value = (String, String, String)> {
        ("[0-9]{1,12}\\.[0-9]{0,18}", "[0-9]{1,12}", "[a-z]{4,6}")
    }

    // Counterparties are unique within a snapshot
    fn snapshot_strategy() -> impl Strategy<Value = DelegationSnapshot> {
        (
            prop::collection::btree_map("cosmos1[a-z0-9]{8}", record_strategy(), 0..20),
            prop::option::of("[A-Za-z0-9+/=]{4,16}"),
        )
            .prop_map(|(entries, next_key)| {
                let records: Vec<DelegationRecord> = entries
                    .into_iter()
                    .map(|(counterparty, (shares, amount, denom))| DelegationRecord {
                        counterparty,
                        shares,
                        balance: Balance { denom, amount },
                    })
                    .collect();

                DelegationSnapshot {
                    account_id: AccountId::new("cosmosvaloper1prop"),
                    pagination: Pagination {
                        next_key,
                        total: records.len().to_string(),
                    },
                    records,
                    captured_at: Utc::now(),
                }
            })
    }

    proptest! {
        #[test]
        fn prop_first_snapshot_always_changed(fresh in snapshot_strategy()) {
            prop_assert!(Reconciler::decide(None, &fresh).changed);
        }

        #[test]
        fn prop_same_snapshot_never_changed(snapshot in snapshot_strategy()) {
            prop_assert!(!Reconciler::decide(Some(&snapshot), &snapshot).changed);
        }

        #[test]
        fn prop_reordering_is_not_a_change(snapshot in snapshot_strategy()) {
            let mut reversed = snapshot.clone();
            reversed.records.reverse();
            prop_assert!(!Reconciler::decide(Some(&snapshot), &reversed).changed);
        }
    }
}
