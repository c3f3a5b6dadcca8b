//! Metrics helper structs for convenient metric recording

use std::time::Duration;

use prometheus::{Encoder, TextEncoder};

use crate::store::DeliveryStatus;

use super::{
    EMAILS_DISPATCHED_TOTAL, EMAIL_DISPATCH_LATENCY, EMAIL_TRANSPORT_ERRORS_TOTAL,
    STORAGE_ERRORS_TOTAL, TEMPLATES_RENDERED_TOTAL, TEMPLATE_RENDER_ERRORS_TOTAL,
};

/// Encode all metrics to Prometheus text format
pub fn encode_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer).unwrap_or_default())
}

/// Helper struct for recording dispatch metrics
pub struct DispatchMetrics;

impl DispatchMetrics {
    /// Record a persisted delivery attempt
    pub fn record_attempt(status: DeliveryStatus) {
        EMAILS_DISPATCHED_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();
    }

    /// Record a provider call that produced no attempt
    pub fn record_transport_error() {
        EMAIL_TRANSPORT_ERRORS_TOTAL.inc();
    }

    pub fn record_latency(elapsed: Duration) {
        EMAIL_DISPATCH_LATENCY.observe(elapsed.as_secs_f64());
    }
}

/// Helper struct for recording rendering metrics
pub struct RenderMetrics;

impl RenderMetrics {
    pub fn record_rendered() {
        TEMPLATES_RENDERED_TOTAL.inc();
    }

    /// Record a render failure; `kind` is one of `syntax`, `variables`, `render`
    pub fn record_error(kind: &str) {
        TEMPLATE_RENDER_ERRORS_TOTAL.with_label_values(&[kind]).inc();
    }
}

/// Helper struct for recording storage metrics
pub struct StorageMetrics;

impl StorageMetrics {
    pub fn record_error(operation: &str) {
        STORAGE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_metrics_are_exported() {
        DispatchMetrics::record_attempt(DeliveryStatus::Success);
        DispatchMetrics::record_attempt(DeliveryStatus::Error);
        DispatchMetrics::record_transport_error();
        DispatchMetrics::record_latency(Duration::from_millis(120));

        let output = encode_metrics().unwrap();
        assert!(output.contains("email_template_emails_dispatched_total"));
        assert!(output.contains("status=\"success\""));
        assert!(output.contains("email_template_email_transport_errors_total"));
        assert!(output.contains("email_template_email_dispatch_latency_seconds"));
    }

    #[test]
    fn test_render_metrics_increment() {
        let before = TEMPLATES_RENDERED_TOTAL.get();
        RenderMetrics::record_rendered();
        assert!(TEMPLATES_RENDERED_TOTAL.get() > before);

        RenderMetrics::record_error("syntax");
        assert!(TEMPLATE_RENDER_ERRORS_TOTAL.with_label_values(&["syntax"]).get() >= 1);
    }

    #[test]
    fn test_storage_metrics_increment() {
        StorageMetrics::record_error("insert_folder");
        assert!(STORAGE_ERRORS_TOTAL.with_label_values(&["insert_folder"]).get() >= 1);
    }
}
