//! Plume keyword monitor components.
//!
//! This crate provides the stateful side of the monitor: commit sources,
//! the per-message processing loop, aggregate counters and snapshot files.
//!
//! # Modules
//!
//! - [`source`] - Commit sources (live firehose, capture replay)
//! - [`monitor`] - Per-message processing loop
//! - [`state`] - Counters and the buffer of unpersisted matches
//! - [`snapshot`] - JSON snapshot writer
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  CommitSource   │  (live firehose, capture replay)
//! └────────┬────────┘
//!          │ CommitMessage
//!          ▼
//! ┌─────────────────┐
//! │     Monitor     │  CAR decode, resolve, extract, keyword filter
//! └────────┬────────┘
//!          │ MatchedPost
//!          ▼
//! ┌─────────────────┐
//! │ AggregateState  │  counters + buffer
//! └────────┬────────┘
//!          │ every N matches, and at shutdown
//!          ▼
//! ┌─────────────────┐
//! │ SnapshotWriter  │  posts_<platform>_<timestamp>.json
//! └─────────────────┘
//! ```

pub mod error;
pub mod monitor;
pub mod snapshot;
pub mod source;
pub mod state;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

pub use monitor::{CommitOutcome, Monitor, MonitorConfig, Summary};
pub use snapshot::{Snapshot, SnapshotConfig, SnapshotWriter};
pub use state::{AggregateState, Counters};

pub use source::{
    CaptureWriter, CommitSource, FirehoseConfig, FirehoseSource, ReplayConfig, ReplaySource,
    SourceStats,
};
