//! Plume keyword monitor daemon.
//!
//! Subscribes to the repository-commit firehose, keeps posts that mention
//! any configured keyword, and writes them to JSON snapshot files.
//!
//! # Usage
//!
//! ```bash
//! # Watch the live firehose
//! plume-ingest --keywords "Pesquisa,clima"
//!
//! # Keywords from the environment, snapshots elsewhere, metrics on :9090
//! PLUME_KEYWORDS="Pesquisa,clima" plume-ingest --output-dir /data/posts --metrics-port 9090
//!
//! # Record raw frames, then replay them offline
//! plume-ingest --keywords clima --capture frames.bin
//! plume-ingest --keywords clima --replay frames.bin
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM for graceful shutdown:
//! 1. Stops reading frames
//! 2. Flushes any buffered matches to a final snapshot
//! 3. Logs the message, post and match counters
//! 4. Exits cleanly

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use metrics::gauge;
use plume_core::metrics::{init_metrics, start_metrics_server};
use plume_core::{CommitMessage, KeywordFilter};
use plume_ingest::{
    CommitSource, FirehoseConfig, FirehoseSource, Monitor, MonitorConfig, ReplayConfig,
    ReplaySource, SnapshotConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::EnvFilter;

/// Plume keyword monitor.
#[derive(Parser, Debug)]
#[command(name = "plume-ingest")]
#[command(about = "Keyword monitor for the repository-commit firehose")]
#[command(version)]
struct Args {
    /// Keywords to match (comma-separated, case-insensitive substrings)
    #[arg(long, env = "PLUME_KEYWORDS", value_delimiter = ',', required = true)]
    keywords: Vec<String>,

    /// Output directory for snapshot files
    #[arg(long, short, default_value = ".")]
    output_dir: PathBuf,

    /// Platform label used in snapshot file names
    #[arg(long, default_value = "bluesky")]
    platform: String,

    /// Write a snapshot every N matches
    #[arg(long, default_value = "10")]
    flush_every: u64,

    /// Force a snapshot once this many matches are buffered
    #[arg(long, default_value = "1000")]
    max_buffered: usize,

    /// Log counters every N messages (0 to disable)
    #[arg(long, default_value = "500")]
    status_interval: u64,

    /// Relay base URL
    #[arg(long, default_value = "wss://bsky.network")]
    firehose_url: String,

    /// Sequence number to resume the firehose from
    #[arg(long)]
    cursor: Option<i64>,

    /// Record raw firehose frames to this file
    #[arg(long)]
    capture: Option<PathBuf>,

    /// Replay frames from a capture file instead of connecting
    #[arg(long, conflicts_with_all = ["capture", "cursor"])]
    replay: Option<PathBuf>,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install rustls crypto provider (required when both ring and aws-lc-rs are present)
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse()?)
                .add_directive("plume_ingest=debug".parse()?),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Plume keyword monitor starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics().context("Failed to install metrics recorder")?;
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
        gauge!("firehose_running").set(1.0);
    }

    // Set up graceful shutdown
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping gracefully...");
        running_clone.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let filter = KeywordFilter::new(args.keywords.iter().map(|k| k.trim().to_string()))
        .context("Invalid keywords")?;

    let monitor_config = MonitorConfig {
        flush_every: args.flush_every,
        max_buffered: args.max_buffered,
        status_interval: args.status_interval,
        snapshot: SnapshotConfig {
            output_dir: args.output_dir.clone(),
            platform: args.platform.clone(),
            ..Default::default()
        },
    };

    tracing::info!("Configuration:");
    tracing::info!("  Keywords: {}", filter.keywords().join(", "));
    tracing::info!("  Output: {}", args.output_dir.display());
    tracing::info!("  Flush every: {} matches", args.flush_every);
    match &args.replay {
        Some(path) => tracing::info!("  Replay: {}", path.display()),
        None => tracing::info!("  Firehose: {}", args.firehose_url),
    }

    let mut monitor = Monitor::new(monitor_config, filter).context("Failed to create monitor")?;

    let handler_running = Arc::clone(&running);
    let handler = |commit: CommitMessage| -> plume_ingest::Result<bool> {
        if !handler_running.load(Ordering::SeqCst) {
            return Ok(false);
        }
        // Snapshot failures are logged by the monitor and the buffer is
        // retried at the next flush, so the stream keeps going.
        if let Err(e) = monitor.handle_commit(&commit) {
            tracing::debug!("Continuing after snapshot failure: {}", e);
        }
        Ok(true)
    };

    tracing::info!("Starting monitor...");

    let source_result = match &args.replay {
        Some(path) => ReplaySource::new(ReplayConfig {
            input: path.clone(),
            ..Default::default()
        })
        .process(handler),
        None => {
            let config = FirehoseConfig {
                url: args.firehose_url.clone(),
                cursor: args.cursor,
                capture: args.capture.clone(),
                ..Default::default()
            };
            FirehoseSource::new(config, Arc::clone(&running))
                .run_async(handler)
                .await
        }
    };

    // Shutdown sequence
    tracing::info!("Shutting down...");

    let summary = monitor.finish();
    gauge!("firehose_running").set(0.0);

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Messages processed:   {}", summary.counters.total_messages);
    tracing::info!("Posts analyzed:       {}", summary.counters.total_posts);
    tracing::info!("Matching posts:       {}", summary.counters.matching_posts);
    tracing::info!("Snapshots written:    {}", summary.counters.snapshots_written);
    match &source_result {
        Ok(stats) => {
            tracing::info!("Frames received:      {}", stats.total_frames);
            tracing::info!("Undecodable frames:   {}", stats.decode_errors);
            if let Some(seq) = stats.last_seq {
                tracing::info!("Last seq (cursor):    {}", seq);
            }
        }
        Err(e) => tracing::error!("Source stopped with error: {}", e),
    }

    match summary.final_flush {
        Ok(Some(snapshot)) => tracing::info!(
            "Final snapshot: {} posts in {}",
            snapshot.post_count,
            snapshot.path.display()
        ),
        Ok(None) => {}
        Err(e) => {
            return Err(anyhow!(e).context(format!(
                "Final snapshot failed, {} matched posts were not saved",
                summary.unflushed
            )));
        }
    }

    source_result.context("Commit source failed")?;
    Ok(())
}
