use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge, IntCounter,
    IntCounterVec, IntGauge,
};

lazy_static! {
    pub static ref NOTIFICATIONS_PROCESSED: IntCounterVec = register_int_counter_vec!(
        "comp_depends_notifications_processed_total",
        "change notifications applied to the dependency index",
        &["event_type"],
    )
    .unwrap();

    pub static ref NOTIFICATIONS_FAILED: IntCounterVec = register_int_counter_vec!(
        "comp_depends_notifications_failed_total",
        "change notifications that could not be applied",
        &["event_type"],
    )
    .unwrap();

    pub static ref DEPENDENCY_RECORDS: IntGauge = register_int_gauge!(
        "comp_depends_dependency_records",
        "dependency records known after the last refresh"
    )
    .unwrap();

    pub static ref CACHE_REFRESHES: IntCounter = register_int_counter!(
        "comp_depends_cache_refreshes_total",
        "full reloads of the maintainer caches"
    )
    .unwrap();

    /// Executor outcomes with result label {success, failure}.
    pub static ref COMPUTATIONS_EXECUTED: IntCounterVec = register_int_counter_vec!(
        "comp_depends_computations_executed_total",
        "resolved computations handed to the executor",
        &["result"],
    )
    .unwrap();
}
