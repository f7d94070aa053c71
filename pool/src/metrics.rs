//! Prometheus instrumentation for the object pool.

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};

/// Metrics for a single pool.
pub(crate) struct PoolMetrics {
    /// Pool-owned objects currently held by callers.
    pub acquired: Gauge,
    /// Free objects currently available in the ring.
    pub available: Gauge,
    /// Total number of acquisitions served from the ring.
    pub acquisitions_total: Counter,
    /// Total number of pool-owned objects returned.
    pub releases_total: Counter,
    /// Total number of overflow allocations taken while the ring was empty.
    pub overflow_allocations_total: Counter,
    /// Total number of overflow objects destroyed on release.
    pub overflow_frees_total: Counter,
}

impl PoolMetrics {
    pub(crate) fn new(registry: &mut Registry) -> Self {
        let metrics = Self {
            acquired: Gauge::default(),
            available: Gauge::default(),
            acquisitions_total: Counter::default(),
            releases_total: Counter::default(),
            overflow_allocations_total: Counter::default(),
            overflow_frees_total: Counter::default(),
        };

        registry.register(
            "object_pool_acquired",
            "Number of pool-owned objects currently held by callers",
            metrics.acquired.clone(),
        );
        registry.register(
            "object_pool_available",
            "Number of free objects currently available in the pool",
            metrics.available.clone(),
        );
        registry.register(
            "object_pool_acquisitions_total",
            "Total number of acquisitions served from the pool",
            metrics.acquisitions_total.clone(),
        );
        registry.register(
            "object_pool_releases_total",
            "Total number of pool-owned objects returned",
            metrics.releases_total.clone(),
        );
        registry.register(
            "object_pool_overflow_allocations_total",
            "Total number of heap allocations taken while the pool was empty",
            metrics.overflow_allocations_total.clone(),
        );
        registry.register(
            "object_pool_overflow_frees_total",
            "Total number of overflow objects destroyed on release",
            metrics.overflow_frees_total.clone(),
        );

        metrics
    }
}
