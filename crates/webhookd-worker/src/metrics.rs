/*!
 * Prometheus Metrics
 *
 * Exposes metrics on the `/metrics` endpoint for scraping.
 */

use lazy_static::lazy_static;
use prometheus::{
    opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec, IntCounterVec,
    TextEncoder,
};

lazy_static! {
    /// Delivery outcomes by result: delivered, failed, dead_letter, retrying.
    pub static ref DELIVERY_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhookd_delivery_attempts_total", "Total number of delivery attempts"),
        &["outcome"]
    )
    .expect("metric can be created");

    /// End-to-end duration of one `send_webhook` call.
    pub static ref DELIVERY_DURATION: HistogramVec = register_histogram_vec!(
        "webhookd_delivery_duration_seconds",
        "Delivery attempt duration in seconds",
        &["outcome"],
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("metric can be created");

    /// HTTP status codes received from subscriber endpoints.
    pub static ref HTTP_RESPONSES_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhookd_http_responses_total", "Total HTTP responses by status code"),
        &["status_code"]
    )
    .expect("metric can be created");

    /// Deliveries scheduled for a delayed retry.
    pub static ref RETRY_SCHEDULED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhookd_retry_scheduled_total", "Total deliveries republished with a delay"),
        &["tries"]
    )
    .expect("metric can be created");

    /// Messages consumed from the broker.
    pub static ref MESSAGES_CONSUMED_TOTAL: IntCounterVec = register_int_counter_vec!(
        opts!("webhookd_messages_consumed_total", "Total messages pulled from the broker"),
        &["decode_result"]
    )
    .expect("metric can be created");
}

/// Render all registered metrics in Prometheus text exposition format.
pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_render_without_panicking() {
        DELIVERY_ATTEMPTS_TOTAL.with_label_values(&["delivered"]).inc();
        let rendered = render_metrics().unwrap();
        assert!(rendered.contains("webhookd_delivery_attempts_total"));
    }
}
