//! Commit sources.
//!
//! This module provides adapters that deliver decoded commit messages to the
//! monitor.
//!
//! # Available Sources
//!
//! - [`FirehoseSource`] - Live `com.atproto.sync.subscribeRepos` WebSocket
//! - [`ReplaySource`] - Reads frames captured from a previous live run
//!
//! # Architecture
//!
//! Both sources see the same raw binary frames and share [`dispatch_frame`],
//! so a replayed capture is handled exactly like the live stream it came
//! from.

mod capture;
mod firehose;
mod replay;

pub use capture::{CaptureWriter, read_frame};
pub use firehose::{FirehoseConfig, FirehoseSource};
pub use replay::{ReplayConfig, ReplaySource};

use crate::Result;
use metrics::{counter, gauge};
use plume_core::{CommitMessage, Frame, decode_frame};

/// A source of commit messages.
pub trait CommitSource {
    /// Human-readable name for this source (used in logs).
    fn name(&self) -> &'static str;

    /// Process commits from this source, calling the handler for each one.
    ///
    /// The handler returns `Ok(true)` to continue, `Ok(false)` to stop
    /// gracefully, or `Err` to abort with an error.
    fn process<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(CommitMessage) -> Result<bool>;
}

/// Statistics from processing a commit source.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Binary frames received.
    pub total_frames: usize,

    /// Frames that decoded to a commit.
    pub commits: usize,

    /// Non-commit frames (`#identity`, `#account`, `#info`, ...).
    pub other_frames: usize,

    /// Frames that failed to decode.
    pub decode_errors: usize,

    /// Raw frame bytes received.
    pub bytes_read: usize,

    /// Sequence number of the last frame that carried one.
    pub last_seq: Option<i64>,
}

/// Decode one raw frame and hand commits to `handler`.
///
/// Non-commit frames and undecodable frames are counted and skipped. An error
/// frame from the relay ends the stream and is returned as an error.
pub fn dispatch_frame<F>(bytes: &[u8], stats: &mut SourceStats, handler: &mut F) -> Result<bool>
where
    F: FnMut(CommitMessage) -> Result<bool>,
{
    stats.total_frames += 1;
    stats.bytes_read += bytes.len();
    counter!("firehose_frames_total").increment(1);

    let frame = match decode_frame(bytes) {
        Ok(frame) => frame,
        Err(e @ plume_core::Error::ErrorFrame { .. }) => {
            tracing::warn!("Relay sent {}", e);
            return Err(e.into());
        }
        Err(e) => {
            tracing::debug!("Skipping undecodable frame: {}", e);
            stats.decode_errors += 1;
            return Ok(true);
        }
    };

    if let Some(seq) = frame.seq() {
        stats.last_seq = Some(seq);
        gauge!("firehose_last_seq").set(seq as f64);
    }

    match frame {
        Frame::Commit(commit) => {
            stats.commits += 1;
            handler(commit)
        }
        Frame::Other { kind, seq } => {
            stats.other_frames += 1;
            tracing::trace!("Ignoring {} frame (seq {:?})", kind, seq);
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use plume_core::testing::{CommitBuilder, error_frame, info_frame};

    #[test]
    fn test_dispatch_commit() {
        let mut stats = SourceStats::default();
        let mut seen = Vec::new();
        let frame = CommitBuilder::new("did:plc:alice")
            .seq(5)
            .post("a", "hello")
            .frame();

        let cont = dispatch_frame(&frame, &mut stats, &mut |commit: CommitMessage| {
            seen.push(commit.repo);
            Ok(true)
        })
        .unwrap();

        assert!(cont);
        assert_eq!(seen, vec!["did:plc:alice"]);
        assert_eq!(stats.commits, 1);
        assert_eq!(stats.last_seq, Some(5));
        assert_eq!(stats.bytes_read, frame.len());
    }

    #[test]
    fn test_dispatch_ignores_other_frames() {
        let mut stats = SourceStats::default();
        let mut calls = 0;
        let cont = dispatch_frame(&info_frame("OutdatedCursor"), &mut stats, &mut |_| {
            calls += 1;
            Ok(true)
        })
        .unwrap();

        assert!(cont);
        assert_eq!(calls, 0);
        assert_eq!(stats.other_frames, 1);
    }

    #[test]
    fn test_dispatch_skips_garbage() {
        let mut stats = SourceStats::default();
        let cont = dispatch_frame(&[0xff, 0x00, 0x01], &mut stats, &mut |_| Ok(true)).unwrap();
        assert!(cont);
        assert_eq!(stats.decode_errors, 1);
    }

    #[test]
    fn test_dispatch_reports_error_frame() {
        let mut stats = SourceStats::default();
        let err = dispatch_frame(
            &error_frame("ConsumerTooSlow", "falling behind"),
            &mut stats,
            &mut |_| Ok(true),
        )
        .unwrap_err();

        match err {
            Error::Core(plume_core::Error::ErrorFrame { error, .. }) => {
                assert_eq!(error, "ConsumerTooSlow");
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn test_dispatch_propagates_stop() {
        let mut stats = SourceStats::default();
        let frame = CommitBuilder::new("did:plc:alice").frame();
        let cont = dispatch_frame(&frame, &mut stats, &mut |_| Ok(false)).unwrap();
        assert!(!cont);
    }
}
