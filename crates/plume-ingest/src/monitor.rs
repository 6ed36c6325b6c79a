//! Per-message processing loop.
//!
//! [`Monitor::handle_commit`] takes one commit through the whole pipeline:
//!
//! ```text
//! CAR archive ──▶ BlockStore ──▶ resolve ──▶ extract ──▶ keyword filter
//!                                                             │
//!                                  SnapshotWriter ◀── AggregateState
//! ```
//!
//! Decode problems never escape: a bad archive drops the message, a bad
//! record skips the operation. The only error surfaced to the caller is a
//! failed snapshot write, and even then the buffer is kept for the next
//! flush.

use crate::error::{Error, Result};
use crate::snapshot::{Snapshot, SnapshotConfig, SnapshotWriter};
use crate::state::{AggregateState, Counters};
use chrono::Local;
use metrics::{counter, gauge};
use plume_core::{
    BlockStore, CommitMessage, KeywordFilter, MatchedPost, Operation, RecordError, extract,
    resolve,
};
use tracing::{debug, error, info};

/// Characters of post text shown in match logs.
const LOG_TEXT_CHARS: usize = 300;

/// Configuration for the monitor.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Flush every N matches.
    /// Default: 10
    pub flush_every: u64,

    /// Buffered matches that force a flush regardless of `flush_every`.
    /// Default: 1000
    pub max_buffered: usize,

    /// Log a status line every N processed messages (0 disables).
    /// Default: 500
    pub status_interval: u64,

    pub snapshot: SnapshotConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            flush_every: 10,
            max_buffered: 1000,
            status_interval: 500,
            snapshot: SnapshotConfig::default(),
        }
    }
}

/// What happened to one commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The block archive did not decode; nothing was counted.
    Dropped,
    /// The message was processed.
    Processed {
        /// Post create-operations examined.
        posts: usize,
        /// Of those, posts that matched.
        matches: usize,
    },
}

/// Final report from [`Monitor::finish`].
#[derive(Debug)]
pub struct Summary {
    pub counters: Counters,
    /// Outcome of the shutdown flush.
    pub final_flush: Result<Option<Snapshot>>,
    /// Matches still unpersisted after the shutdown flush.
    pub unflushed: usize,
}

/// Keyword monitor over a stream of commits.
pub struct Monitor {
    config: MonitorConfig,
    filter: KeywordFilter,
    state: AggregateState,
    writer: SnapshotWriter,
}

impl Monitor {
    /// Create a monitor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero flush period or buffer cap, and
    /// an I/O error if the output directory cannot be created.
    pub fn new(config: MonitorConfig, filter: KeywordFilter) -> Result<Self> {
        if config.flush_every == 0 {
            return Err(Error::Config("flush_every must be at least 1".to_string()));
        }
        if config.max_buffered == 0 {
            return Err(Error::Config("max_buffered must be at least 1".to_string()));
        }

        let writer = SnapshotWriter::new(config.snapshot.clone())?;

        info!(
            "Monitor initialized: {} keywords, flush_every={}, max_buffered={}",
            filter.len(),
            config.flush_every,
            config.max_buffered
        );

        Ok(Self {
            config,
            filter,
            state: AggregateState::new(),
            writer,
        })
    }

    pub fn state(&self) -> &AggregateState {
        &self.state
    }

    pub fn counters(&self) -> Counters {
        self.state.counters()
    }

    /// Process one commit message.
    ///
    /// All operations are processed even if a flush fails midway; the first
    /// flush error is returned afterwards.
    pub fn handle_commit(&mut self, commit: &CommitMessage) -> Result<CommitOutcome> {
        let blocks = match BlockStore::from_car(&commit.blocks) {
            Ok(blocks) => blocks,
            Err(e) => {
                debug!(
                    "Dropping commit from {} (seq {:?}): {}",
                    commit.repo, commit.seq, e
                );
                counter!("firehose_messages_dropped_total").increment(1);
                return Ok(CommitOutcome::Dropped);
            }
        };

        self.state.record_message();
        counter!("firehose_messages_total").increment(1);

        let mut posts = 0;
        let mut matches = 0;
        let mut flush_error = None;

        for op in commit.ops.iter().filter(|op| op.is_post_create()) {
            posts += 1;
            self.state.record_post();
            counter!("firehose_posts_total").increment(1);

            let Some(post) = self.evaluate(commit, op, &blocks) else {
                continue;
            };

            matches += 1;
            self.record_match(post);

            if self.flush_due()
                && let Err(e) = self.flush()
                && flush_error.is_none()
            {
                flush_error = Some(e);
            }
        }

        self.maybe_log_status();

        match flush_error {
            Some(e) => Err(e),
            None => Ok(CommitOutcome::Processed { posts, matches }),
        }
    }

    /// Resolve, filter and enrich one post operation.
    fn evaluate(
        &self,
        commit: &CommitMessage,
        op: &Operation,
        blocks: &BlockStore<'_>,
    ) -> Option<MatchedPost> {
        let Some(cid) = &op.cid else {
            skip(commit, op, "no_cid", "create without a CID");
            return None;
        };

        let record = match resolve(cid, blocks) {
            Ok(record) => record,
            Err(e) => {
                skip_record(commit, op, &e);
                return None;
            }
        };

        let text = record.candidate_text()?;
        let keywords = self.filter.find(text)?;

        Some(MatchedPost::new(
            commit,
            op,
            text.to_string(),
            keywords,
            extract(&record),
            Local::now(),
        ))
    }

    fn record_match(&mut self, post: MatchedPost) {
        info!(
            "Match #{} [{}] by {}: {}",
            self.state.counters().matching_posts + 1,
            post.keywords_found.join(", "),
            post.author_did,
            truncate(&post.text, LOG_TEXT_CHARS)
        );
        counter!("firehose_matches_total").increment(1);

        self.state.record_match(post);
        gauge!("snapshot_buffered_posts").set(self.state.buffer().len() as f64);
    }

    fn flush_due(&self) -> bool {
        self.state.counters().matching_posts % self.config.flush_every == 0
            || self.state.buffer().len() >= self.config.max_buffered
    }

    fn maybe_log_status(&self) {
        let counters = self.state.counters();
        if status_due(counters.total_messages, self.config.status_interval) {
            info!("[STATS] {}", counters);
        }
    }

    /// Write the buffer to a new snapshot file and clear it.
    ///
    /// A no-op returning `None` when the buffer is empty. On failure the
    /// buffer is left intact.
    pub fn flush(&mut self) -> Result<Option<Snapshot>> {
        match self.writer.write(self.state.buffer()) {
            Ok(Some(snapshot)) => {
                self.state.mark_persisted(snapshot.post_count);
                counter!("snapshots_written_total").increment(1);
                counter!("snapshot_posts_written_total").increment(snapshot.post_count as u64);
                gauge!("snapshot_buffered_posts").set(self.state.buffer().len() as f64);
                Ok(Some(snapshot))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                error!(
                    "Snapshot failed, keeping {} posts buffered: {}",
                    self.state.buffer().len(),
                    e
                );
                counter!("snapshot_failures_total").increment(1);
                Err(e)
            }
        }
    }

    /// Perform the final flush and report.
    pub fn finish(mut self) -> Summary {
        let final_flush = self.flush();
        Summary {
            counters: self.state.counters(),
            final_flush,
            unflushed: self.state.buffer().len(),
        }
    }
}

fn skip(commit: &CommitMessage, op: &Operation, reason: &'static str, detail: &str) {
    debug!("Skipping {}: {}", commit.record_uri(&op.path), detail);
    counter!("firehose_ops_skipped_total", "reason" => reason).increment(1);
}

fn skip_record(commit: &CommitMessage, op: &Operation, e: &RecordError) {
    skip(commit, op, e.kind(), &e.to_string());
}

/// Whether a status line is due after `total_messages` processed messages.
/// An interval of zero disables status lines.
fn status_due(total_messages: u64, interval: u64) -> bool {
    interval > 0 && total_messages > 0 && total_messages % interval == 0
}

/// First `max` characters of `text`, with an ellipsis if cut.
fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
