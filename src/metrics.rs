use std::net::SocketAddr;

use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

/// One-time metrics registration (so series show up on /metrics before the first cycle).
pub fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawler_cycles_total", "Completed crawl cycles.");
        describe_counter!(
            "crawler_posts_processed_total",
            "New (previously unseen) posts handled."
        );
        describe_counter!("crawler_posts_notified_total", "Posts delivered to the webhook.");
        describe_counter!(
            "crawler_posts_filtered_total",
            "Posts scored below the minimum and not notified."
        );
        describe_counter!("crawler_delivery_errors_total", "Failed webhook deliveries.");
        describe_counter!(
            "crawler_eval_errors_total",
            "Scoring failures that fell back to plain notifications."
        );
        describe_counter!(
            "crawler_fetch_errors_total",
            "Fetch failures per watch target, by kind."
        );
        describe_counter!(
            "crawler_persist_errors_total",
            "Failed writes of the seen store."
        );
        describe_gauge!("crawler_seen_ids", "Post ids in the seen store.");
        describe_gauge!("crawler_last_cycle_ts", "Unix ts when the last cycle finished.");
        describe_histogram!("crawler_cycle_duration_ms", "Cycle wall time in milliseconds.");
    });
}

/// Serve Prometheus metrics on `addr` (`GET /metrics`). Needs a running Tokio runtime.
pub fn install_exporter(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("prometheus: listen on {addr}"))?;
    ensure_metrics_described();
    Ok(())
}

/// Install an in-process recorder and return its handle (for tests and tooling).
pub fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("prometheus: install recorder")?;
    ensure_metrics_described();
    Ok(handle)
}
