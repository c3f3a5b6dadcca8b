//! Prometheus metrics for the email template service.
//!
//! - Dispatch metrics (attempts by status, transport errors, provider latency)
//! - Rendering metrics (rendered fields, render failures)
//! - Storage metrics (backend errors by operation)

mod helpers;

pub use helpers::{encode_metrics, DispatchMetrics, RenderMetrics, StorageMetrics};

use lazy_static::lazy_static;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "email_template";

lazy_static! {
    // ============================================================================
    // Dispatch Metrics
    // ============================================================================

    /// Recorded delivery attempts by classified status
    pub static ref EMAILS_DISPATCHED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_emails_dispatched_total", METRIC_PREFIX),
        "Total delivery attempts recorded, by status",
        &["status"]
    ).unwrap();

    /// Provider round trips that never produced a classifiable response
    pub static ref EMAIL_TRANSPORT_ERRORS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_email_transport_errors_total", METRIC_PREFIX),
        "Total provider calls that failed in transport or returned a malformed body"
    ).unwrap();

    /// Provider round-trip latency
    pub static ref EMAIL_DISPATCH_LATENCY: Histogram = register_histogram!(
        format!("{}_email_dispatch_latency_seconds", METRIC_PREFIX),
        "Provider round-trip latency in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).unwrap();

    // ============================================================================
    // Rendering Metrics
    // ============================================================================

    pub static ref TEMPLATES_RENDERED_TOTAL: IntCounter = register_int_counter!(
        format!("{}_templates_rendered_total", METRIC_PREFIX),
        "Total template texts rendered with variables"
    ).unwrap();

    pub static ref TEMPLATE_RENDER_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_render_errors_total", METRIC_PREFIX),
        "Total template render failures, by kind",
        &["kind"]
    ).unwrap();

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    pub static ref STORAGE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_storage_errors_total", METRIC_PREFIX),
        "Total storage backend errors, by operation",
        &["operation"]
    ).unwrap();
}
