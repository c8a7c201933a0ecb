//! # Detection Metrics
//!
//! Prometheus metrics for doppelganger checks.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! dg-detection = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `doppelganger_group_in_check` - Gauge per group, 1 while a window is open
//! - `doppelganger_checks_total` - Counter of check requests (by outcome)
//! - `doppelganger_not_found_ratio` - Histogram of not-found ratios of evaluated windows
//! - `doppelganger_sweep_cleared_total` - Counter of rows returned to idle by the sweep

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Open window flag per group
    pub static ref GROUP_IN_CHECK: GaugeVec = register_gauge_vec!(
        "doppelganger_group_in_check",
        "Whether the group currently has an open doppelganger window (0=no, 1=yes)",
        &["group"]
    )
    .expect("Failed to create GROUP_IN_CHECK metric");

    /// Check requests, labeled by outcome
    pub static ref CHECKS: IntCounterVec = register_int_counter_vec!(
        "doppelganger_checks_total",
        "Total number of doppelganger check requests",
        &["outcome"]
    )
    .expect("Failed to create CHECKS metric");

    /// Not-found ratio of evaluated windows
    pub static ref NOT_FOUND_RATIO: Histogram = register_histogram!(
        "doppelganger_not_found_ratio",
        "Fraction of duties whose block data could not be fetched",
        vec![0.0, 0.05, 0.1, 0.2, 0.3, 0.45, 0.6, 0.8, 1.0]
    )
    .expect("Failed to create NOT_FOUND_RATIO metric");

    /// Rows cleared by the sweep
    pub static ref SWEEP_CLEARED: IntCounter = register_int_counter!(
        "doppelganger_sweep_cleared_total",
        "Total number of validator windows closed by the sweep"
    )
    .expect("Failed to create SWEEP_CLEARED metric");
}

// =============================================================================
// METRIC RECORDING FUNCTIONS
// =============================================================================

/// Update the open-window gauge of a group
#[cfg(feature = "metrics")]
pub fn set_group_in_check(group: &str, active: bool) {
    GROUP_IN_CHECK
        .with_label_values(&[group])
        .set(if active { 1.0 } else { 0.0 });
}

/// Record a check outcome
#[cfg(feature = "metrics")]
pub fn record_check(outcome: &str) {
    CHECKS.with_label_values(&[outcome]).inc();
}

/// Record the not-found ratio of an evaluated window
#[cfg(feature = "metrics")]
pub fn observe_not_found_ratio(ratio: f64) {
    NOT_FOUND_RATIO.observe(ratio);
}

/// Record rows cleared by a sweep pass
#[cfg(feature = "metrics")]
pub fn record_sweep_cleared(count: u64) {
    SWEEP_CLEARED.inc_by(count);
}

// =============================================================================
// NO-OP IMPLEMENTATIONS (when metrics feature disabled)
// =============================================================================

#[cfg(not(feature = "metrics"))]
pub fn set_group_in_check(_group: &str, _active: bool) {}

#[cfg(not(feature = "metrics"))]
pub fn record_check(_outcome: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn observe_not_found_ratio(_ratio: f64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_sweep_cleared(_count: u64) {}
