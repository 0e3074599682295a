//! # Controller Metrics
//!
//! Metrics for controller operations: reconciliations, requeues, propagation,
//! finalizer deadlines and awaiter timeouts. Most are labelled by resource kind.

use crate::observability::metrics::registry::REGISTRY;
use anyhow::Result;
use prometheus::{HistogramVec, IntCounterVec};
use std::sync::LazyLock;

// Controller reconciliation metrics
static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new("cf_controller_reconciliations_total", "Total number of reconciliations"),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "cf_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

// Requeue metrics
static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_requeues_total",
            "Total number of reconciliation requeues",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

// Propagation metrics
static PROPAGATED_OBJECTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_propagated_objects_total",
            "Total number of objects created or updated in child namespaces",
        ),
        &["kind"],
    )
    .expect("Failed to create PROPAGATED_OBJECTS_TOTAL metric - this should never happen")
});

static PRUNED_OBJECTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_pruned_objects_total",
            "Total number of stale propagated objects deleted from child namespaces",
        ),
        &["kind"],
    )
    .expect("Failed to create PRUNED_OBJECTS_TOTAL metric - this should never happen")
});

// Finalizer and awaiter metrics
static FINALIZER_GIVE_UPS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_finalizer_give_ups_total",
            "Total number of finalizations that gave up on contained objects after the deadline",
        ),
        &["kind"],
    )
    .expect("Failed to create FINALIZER_GIVE_UPS_TOTAL metric - this should never happen")
});

static AWAITER_TIMEOUTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "cf_controller_awaiter_timeouts_total",
            "Total number of condition waits that timed out",
        ),
        &["kind"],
    )
    .expect("Failed to create AWAITER_TIMEOUTS_TOTAL metric - this should never happen")
});

/// Register controller metrics with the registry
pub(crate) fn register_controller_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROPAGATED_OBJECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PRUNED_OBJECTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(FINALIZER_GIVE_UPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(AWAITER_TIMEOUTS_TOTAL.clone()))?;
    Ok(())
}

// Public functions for controller metrics

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

pub fn increment_requeues_total(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_propagated(kind: &str) {
    PROPAGATED_OBJECTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_pruned(kind: &str) {
    PRUNED_OBJECTS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_finalizer_give_ups(kind: &str) {
    FINALIZER_GIVE_UPS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_awaiter_timeouts(kind: &str) {
    AWAITER_TIMEOUTS_TOTAL.with_label_values(&[kind]).inc();
}
