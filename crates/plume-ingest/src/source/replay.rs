//! Replay source for captured frames.
//!
//! Reads a capture file written by [`CaptureWriter`](super::CaptureWriter)
//! and feeds each frame through the same dispatch as the live firehose.

use super::{CommitSource, SourceStats, dispatch_frame, read_frame};
use crate::{Error, Result};
use plume_core::CommitMessage;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

/// Configuration for the replay source.
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Capture file to read.
    pub input: PathBuf,

    /// Progress reporting interval (frames).
    pub progress_interval: usize,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            progress_interval: 100_000,
        }
    }
}

/// Capture file commit source.
pub struct ReplaySource {
    config: ReplayConfig,
}

impl ReplaySource {
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }
}

impl CommitSource for ReplaySource {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn process<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(CommitMessage) -> Result<bool>,
    {
        let input = &self.config.input;
        let file = File::open(input).map_err(|e| {
            Error::Io(io::Error::new(
                e.kind(),
                format!("cannot open capture {}: {}", input.display(), e),
            ))
        })?;
        let mut reader = BufReader::new(file);
        let mut stats = SourceStats::default();

        tracing::info!("Replaying frames from {}", input.display());

        loop {
            let frame = match read_frame(&mut reader) {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    // A capture cut short by a kill ends mid-frame.
                    tracing::warn!("Capture truncated after {} frames", stats.total_frames);
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if !dispatch_frame(&frame, &mut stats, &mut handler)? {
                tracing::info!("Handler signaled stop");
                break;
            }

            if self.config.progress_interval > 0
                && stats.total_frames.is_multiple_of(self.config.progress_interval)
            {
                tracing::info!(
                    "Replayed {} frames ({} commits)",
                    stats.total_frames,
                    stats.commits
                );
            }
        }

        Ok(stats)
    }
}
