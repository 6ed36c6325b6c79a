//! Prometheus metrics helpers.
//!
//! # Usage
//!
//! ```rust,ignore
//! use plume_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let handle = init_metrics()?;
//!     start_metrics_server(9090, handle).await?;
//!
//!     metrics::counter!("firehose_messages_total").increment(1);
//!     Ok(())
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component (`firehose_`, `snapshot_`)
//! - Suffix: unit or type (`_total`, `_bytes`)
//! - Labels: only low-cardinality ones (`reason`)
//!
//! Without an installed recorder every macro call is a no-op, so library
//! code records unconditionally.

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Install the Prometheus recorder and register metric descriptions.
///
/// # Errors
///
/// Fails if a recorder is already installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(handle)
}

/// Like [`init_metrics`] but returns `None` if a recorder is already installed.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    init_metrics().ok()
}

/// Serve `/metrics` on `port` in a background task.
///
/// The listener is bound before returning, so a taken port is reported here
/// rather than lost inside the task.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Metrics server stopped: {}", e);
        }
    });

    Ok(())
}

fn register_metrics() {
    // =========================================================================
    // Stream
    // =========================================================================

    describe_counter!(
        "firehose_frames_total",
        "Frames received from the transport, commit or not"
    );
    describe_counter!(
        "firehose_messages_total",
        "Commit messages whose archive decoded and were processed"
    );
    describe_counter!(
        "firehose_messages_dropped_total",
        "Commit messages dropped because their block archive failed to decode"
    );
    describe_counter!(
        "firehose_posts_total",
        "Post create-operations examined"
    );
    describe_counter!(
        "firehose_matches_total",
        "Posts that matched at least one keyword"
    );
    describe_counter!(
        "firehose_ops_skipped_total",
        "Post operations skipped (label: reason)"
    );
    describe_gauge!("firehose_last_seq", "Sequence number of the last frame seen");
    describe_gauge!(
        "firehose_running",
        "Whether the monitor is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Snapshots
    // =========================================================================

    describe_counter!("snapshots_written_total", "Snapshot files written");
    describe_counter!(
        "snapshot_posts_written_total",
        "Matched posts persisted to snapshot files"
    );
    describe_counter!(
        "snapshot_failures_total",
        "Snapshot writes that failed and were left buffered"
    );
    describe_gauge!("snapshot_buffered_posts", "Matched posts awaiting a flush");
}
