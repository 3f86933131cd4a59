//! Sync metrics

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

lazy_static::lazy_static! {
    /// Cycles run
    pub static ref SYNC_CYCLES_TOTAL: IntCounter = register_int_counter!(
        "delegation_sync_cycles_total",
        "Total sync cycles run"
    )
    .expect("register delegation_sync_cycles_total");

    /// Cycle duration histogram
    pub static ref SYNC_CYCLE_DURATION: Histogram = register_histogram!(
        "delegation_sync_cycle_duration_seconds",
        "Sync cycle duration",
        vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]
    )
    .expect("register delegation_sync_cycle_duration_seconds");

    /// Per-account outcomes (succeeded/skipped/failed)
    pub static ref SYNC_ACCOUNTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "delegation_sync_accounts_total",
        "Per-account sync outcomes",
        &["outcome"]
    )
    .expect("register delegation_sync_accounts_total");

    /// Records fetched
    pub static ref SYNC_RECORDS_PROCESSED: IntCounter = register_int_counter!(
        "delegation_sync_records_processed_total",
        "Delegation records fetched across all cycles"
    )
    .expect("register delegation_sync_records_processed_total");

    /// Upstream attempts by result
    pub static ref FETCH_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "delegation_sync_fetch_attempts_total",
        "Upstream fetch attempts",
        &["result"]
    )
    .expect("register delegation_sync_fetch_attempts_total");
}
