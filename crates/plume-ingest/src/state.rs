//! Running counters and the buffer of unpersisted matches.
//!
//! [`AggregateState`] is a plain value owned by the monitor; only the
//! processing loop mutates it. At every observation point
//!
//! ```text
//! matching_posts == persisted_posts + buffer.len()
//! ```
//!
//! holds, because matches only enter through [`AggregateState::record_match`]
//! and only leave through [`AggregateState::mark_persisted`].

use plume_core::MatchedPost;
use serde::Serialize;
use std::fmt;

/// Snapshot of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Commit messages whose archive decoded.
    pub total_messages: u64,
    /// Post create-operations examined.
    pub total_posts: u64,
    /// Posts that matched at least one keyword.
    pub matching_posts: u64,
    /// Matches written to snapshot files.
    pub persisted_posts: u64,
    pub snapshots_written: u64,
}

impl fmt::Display for Counters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "messages={} posts={} matches={}",
            self.total_messages, self.total_posts, self.matching_posts
        )
    }
}

/// Counters plus buffered matches since the last successful flush.
#[derive(Debug, Default)]
pub struct AggregateState {
    counters: Counters,
    buffer: Vec<MatchedPost>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message(&mut self) {
        self.counters.total_messages += 1;
    }

    pub fn record_post(&mut self) {
        self.counters.total_posts += 1;
    }

    pub fn record_match(&mut self, post: MatchedPost) {
        self.counters.matching_posts += 1;
        self.buffer.push(post);
    }

    /// Matches not yet persisted, in detection order.
    pub fn buffer(&self) -> &[MatchedPost] {
        &self.buffer
    }

    /// Drop the first `count` buffered matches after they were written.
    ///
    /// Called only once the snapshot holding them is safely on disk; a failed
    /// write leaves the buffer untouched so the next flush retries it.
    pub fn mark_persisted(&mut self, count: usize) {
        let count = count.min(self.buffer.len());
        self.buffer.drain(..count);
        self.counters.persisted_posts += count as u64;
        self.counters.snapshots_written += 1;
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    /// Whether the persistence invariant holds. Always true; exposed for tests.
    pub fn is_consistent(&self) -> bool {
        self.counters.matching_posts == self.counters.persisted_posts + self.buffer.len() as u64
    }
}
