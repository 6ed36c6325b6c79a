//! Live firehose source.
//!
//! Subscribes to `com.atproto.sync.subscribeRepos` over a single WebSocket
//! connection and hands each binary frame to [`dispatch_frame`]. There is no
//! reconnect or backoff: when the connection drops the source returns, and
//! the caller decides what to do (typically resume from
//! [`SourceStats::last_seq`] with a new `cursor`).

use super::{CaptureWriter, CommitSource, SourceStats, dispatch_frame};
use crate::{Error, Result};
use futures_util::StreamExt;
use plume_core::CommitMessage;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

/// XRPC method streamed by the relay.
const SUBSCRIBE_REPOS: &str = "com.atproto.sync.subscribeRepos";

/// Configuration for the firehose source.
#[derive(Debug, Clone)]
pub struct FirehoseConfig {
    /// Relay base URL.
    /// Default: "wss://bsky.network"
    pub url: String,

    /// Sequence number to resume from.
    pub cursor: Option<i64>,

    /// Write every raw frame to this file for later replay.
    pub capture: Option<PathBuf>,

    /// How often the running flag is checked while no frames arrive.
    /// Default: 250ms
    pub poll_interval: Duration,

    /// Progress reporting interval (frames).
    pub progress_interval: usize,
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            url: "wss://bsky.network".to_string(),
            cursor: None,
            capture: None,
            poll_interval: Duration::from_millis(250),
            progress_interval: 100_000,
        }
    }
}

impl FirehoseConfig {
    /// Full subscription URL including the XRPC path and cursor.
    pub fn subscribe_url(&self) -> String {
        let base = self.url.trim_end_matches('/');
        let mut url = if base.ends_with(SUBSCRIBE_REPOS) {
            base.to_string()
        } else {
            format!("{base}/xrpc/{SUBSCRIBE_REPOS}")
        };
        if let Some(cursor) = self.cursor {
            url.push_str(&format!("?cursor={cursor}"));
        }
        url
    }
}

/// Live firehose commit source.
pub struct FirehoseSource {
    config: FirehoseConfig,
    /// Cleared to stop; shared with the signal handler.
    running: Arc<AtomicBool>,
}

impl FirehoseSource {
    /// Create a source that runs while `running` is set.
    pub fn new(config: FirehoseConfig, running: Arc<AtomicBool>) -> Self {
        Self { config, running }
    }

    /// Stream frames until stopped, the handler declines, or the relay
    /// closes the connection.
    pub async fn run_async<F>(&self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(CommitMessage) -> Result<bool>,
    {
        let url = self.config.subscribe_url();
        tracing::info!("Connecting to {}", url);

        let (mut ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        tracing::info!("Connected to firehose");

        let mut capture = match &self.config.capture {
            Some(path) => {
                tracing::info!("Capturing raw frames to {}", path.display());
                Some(CaptureWriter::create(path)?)
            }
            None => None,
        };

        let mut stats = SourceStats::default();
        let mut tick = tokio::time::interval(self.config.poll_interval);
        let mut result = Ok(());

        while self.running.load(Ordering::SeqCst) {
            let message = tokio::select! {
                message = ws.next() => message,
                _ = tick.tick() => continue,
            };

            let message = match message {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    result = Err(Error::WebSocket(e));
                    break;
                }
                None => {
                    tracing::info!("Firehose stream ended");
                    break;
                }
            };

            match message {
                Message::Binary(bytes) => {
                    if let Some(capture) = capture.as_mut()
                        && let Err(e) = capture.write_frame(&bytes)
                    {
                        result = Err(e);
                        break;
                    }

                    match dispatch_frame(&bytes, &mut stats, &mut handler) {
                        Ok(true) => {}
                        Ok(false) => {
                            tracing::info!("Handler signaled stop");
                            break;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }

                    if self.config.progress_interval > 0
                        && stats.total_frames.is_multiple_of(self.config.progress_interval)
                    {
                        tracing::info!(
                            "Received {} frames ({} commits, last seq {:?})",
                            stats.total_frames,
                            stats.commits,
                            stats.last_seq
                        );
                    }
                }
                Message::Close(frame) => {
                    tracing::info!("Firehose closed the connection: {:?}", frame);
                    break;
                }
                Message::Text(text) => {
                    tracing::debug!("Ignoring text message: {}", text.as_str());
                }
                _ => {}
            }
        }

        if let Err(e) = ws.close(None).await {
            tracing::debug!("Error closing WebSocket: {}", e);
        }

        if let Some(mut capture) = capture {
            capture.flush()?;
            tracing::info!("Captured {} frames", capture.frames());
        }

        result.map(|()| stats)
    }
}

impl CommitSource for FirehoseSource {
    fn name(&self) -> &'static str {
        "firehose"
    }

    fn process<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(CommitMessage) -> Result<bool>,
    {
        // Create a tokio runtime for the async code
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        rt.block_on(self.run_async(handler))
    }
}
