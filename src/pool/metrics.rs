use lazy_static::lazy_static;
use prometheus::{
    register_int_counter_vec, register_int_gauge_vec, IntCounterVec, IntGaugeVec,
};

lazy_static! {
    pub static ref POOL_CONNECTIONS: IntGaugeVec = register_int_gauge_vec!(
        "rospool_pool_connections",
        "Number of sessions currently held by each target pool",
        &["target"]
    )
    .expect("register rospool_pool_connections gauge_vec");
    pub static ref DIALS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "rospool_dials_total",
        "Total number of sessions successfully dialed per target",
        &["target"]
    )
    .expect("register rospool_dials_total counter_vec");
    pub static ref DIAL_FAILURES: IntCounterVec = register_int_counter_vec!(
        "rospool_dial_failures_total",
        "Total number of failed dial attempts per target",
        &["target"]
    )
    .expect("register rospool_dial_failures_total counter_vec");
    pub static ref HEALTHCHECK_FAILURES: IntCounterVec = register_int_counter_vec!(
        "rospool_healthcheck_failures_total",
        "Total number of failed or timed out health probes per target",
        &["target"]
    )
    .expect("register rospool_healthcheck_failures_total counter_vec");
    pub static ref EVICTIONS: IntCounterVec = register_int_counter_vec!(
        "rospool_connections_evicted_total",
        "Total number of sessions closed by cleanup per target and reason",
        &["target", "reason"]
    )
    .expect("register rospool_connections_evicted_total counter_vec");
}

#[derive(Debug, Clone, Copy)]
pub struct PoolMetrics;

impl PoolMetrics {
    #[inline]
    pub fn record_dial(target: &str, pool_size: usize) {
        DIALS_TOTAL.with_label_values(&[target]).inc();
        Self::set_pool_size(target, pool_size);
    }

    #[inline]
    pub fn record_dial_failure(target: &str) {
        DIAL_FAILURES.with_label_values(&[target]).inc();
    }

    #[inline]
    pub fn record_healthcheck_failure(target: &str) {
        HEALTHCHECK_FAILURES.with_label_values(&[target]).inc();
    }

    /// `reason` is "unhealthy" or "expired"
    #[inline]
    pub fn record_eviction(target: &str, reason: &str) {
        EVICTIONS.with_label_values(&[target, reason]).inc();
    }

    #[inline]
    pub fn set_pool_size(target: &str, pool_size: usize) {
        POOL_CONNECTIONS
            .with_label_values(&[target])
            .set(pool_size as i64);
    }
}
