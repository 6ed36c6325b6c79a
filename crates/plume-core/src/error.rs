//! Error types for firehose decoding.

use crate::cid::Cid;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort decoding of a whole frame or archive.
#[derive(Error, Debug)]
pub enum Error {
    /// The block archive (CAR) could not be parsed. The enclosing message is dropped.
    #[error("archive decode error: {0}")]
    ArchiveDecode(String),

    /// A firehose frame could not be parsed.
    #[error("frame decode error: {0}")]
    Frame(String),

    /// The relay sent an error frame (`op == -1`).
    #[error("firehose error frame: {error}{}", detail_suffix(.message))]
    ErrorFrame {
        /// Error name, e.g. `FutureCursor` or `ConsumerTooSlow`.
        error: String,
        /// Optional human-readable detail.
        message: Option<String>,
    },

    /// A content identifier could not be parsed.
    #[error("invalid CID: {0}")]
    InvalidCid(String),

    /// DAG-CBOR violated the data model (bad tag, indefinite length, ...).
    #[error("DAG-CBOR error: {0}")]
    Cbor(String),

    /// Low-level CBOR decoding error.
    #[error("CBOR decode error: {0}")]
    CborDecode(#[from] minicbor::decode::Error),

    /// Low-level CBOR encoding error.
    #[error("CBOR encode error: {0}")]
    CborEncode(#[from] minicbor::encode::Error<std::convert::Infallible>),

    /// Configuration error (e.g., empty keyword set).
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn detail_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {m}")).unwrap_or_default()
}

/// Why a single create-operation could not be turned into a post record.
///
/// None of these abort the stream: the operation is skipped and processing
/// continues with the next one.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The operation points at a block the archive does not carry.
    #[error("block {0} missing from archive")]
    MissingBlock(Cid),

    /// The block decoded, but it is not a post.
    #[error("block {cid} is not a post: {reason}")]
    SchemaMismatch {
        /// The offending block.
        cid: Cid,
        /// What did not match.
        reason: String,
    },

    /// The block is not valid DAG-CBOR.
    #[error("block {cid} is malformed: {reason}")]
    Malformed {
        /// The offending block.
        cid: Cid,
        /// Decoder detail.
        reason: String,
    },
}

impl RecordError {
    /// Short label used for the `reason` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            RecordError::MissingBlock(_) => "missing_block",
            RecordError::SchemaMismatch { .. } => "schema_mismatch",
            RecordError::Malformed { .. } => "malformed",
        }
    }
}
