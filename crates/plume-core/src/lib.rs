//! Decoding, extraction and keyword matching for the repository-commit firehose.
//!
//! This crate provides:
//! - CID, DAG-CBOR and CARv1 decoding
//! - Firehose frame decoding (`com.atproto.sync.subscribeRepos`)
//! - Schema-tolerant post record resolution and structured extraction
//! - Keyword filtering and the persisted [`MatchedPost`] model
//! - Prometheus metrics helpers
//! - Shared error types
//!
//! Nothing here does network or file I/O; the stateful side lives in
//! `plume-ingest`.

pub mod car;
pub mod cid;
pub mod commit;
pub mod dagcbor;
mod error;
pub mod extract;
pub mod keywords;
pub mod metrics;
pub mod post;
pub mod record;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use car::BlockStore;
pub use cid::Cid;
pub use commit::{Action, CommitMessage, Frame, Operation, POST_COLLECTION, decode_frame};
pub use dagcbor::Node;
pub use error::{Error, RecordError, Result};
pub use extract::{EnrichedPost, extract};
pub use keywords::{KeywordFilter, KeywordMatch, match_keywords};
pub use post::{DETECTED_AT_FORMAT, MatchedPost};
pub use record::{PostRecord, resolve};
