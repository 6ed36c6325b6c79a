//! Commit messages and firehose frames.
//!
//! A `com.atproto.sync.subscribeRepos` frame is two DAG-CBOR values back to
//! back: a header `{op, t}` and a body. `op == 1` is a message whose type is
//! named by `t`; `op == -1` is an error frame carrying `{error, message}`.
//! Only `#commit` bodies matter to the monitor; other message types
//! (`#identity`, `#account`, `#sync`, `#info`) decode to [`Frame::Other`].

use crate::cid::Cid;
use crate::dagcbor::Node;
use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// Collection holding post records.
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

/// Repository operation kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Update,
    Delete,
}

impl Action {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(Action::Create),
            "update" => Some(Action::Update),
            "delete" => Some(Action::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

/// One create/update/delete against a `collection/rkey` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub action: Action,
    pub path: String,
    /// Target block. Deletes carry none.
    pub cid: Option<Cid>,
}

impl Operation {
    /// Collection NSID, the part of the path before the first `/`.
    pub fn collection(&self) -> &str {
        self.path
            .split_once('/')
            .map_or(self.path.as_str(), |(collection, _)| collection)
    }

    /// True for creates in exactly the post collection (not `app.bsky.feed.postgate`).
    pub fn is_post_create(&self) -> bool {
        self.action == Action::Create && self.collection() == POST_COLLECTION
    }
}

/// One commit as delivered by the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitMessage {
    /// DID of the repository that committed.
    pub repo: String,
    /// CARv1 archive with the blocks the operations reference.
    pub blocks: Vec<u8>,
    pub ops: Vec<Operation>,
    /// Stream sequence number, usable as a resume cursor.
    pub seq: Option<i64>,
    pub rev: Option<String>,
    pub time: Option<String>,
    /// The relay dropped the blocks because the commit was oversized.
    pub too_big: bool,
}

impl CommitMessage {
    /// Canonical `at://` URI of the record at `path` in this repository.
    pub fn record_uri(&self, path: &str) -> String {
        format!("at://{}/{}", self.repo, path)
    }
}

/// A decoded firehose frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Commit(CommitMessage),
    /// Any non-commit message type.
    Other { kind: String, seq: Option<i64> },
}

impl Frame {
    /// Sequence number of the frame, if it carries one.
    pub fn seq(&self) -> Option<i64> {
        match self {
            Frame::Commit(commit) => commit.seq,
            Frame::Other { seq, .. } => *seq,
        }
    }
}

/// Decode one binary WebSocket frame.
///
/// # Errors
///
/// - [`Error::ErrorFrame`] for `op == -1`
/// - [`Error::Frame`] for a malformed header or commit body
pub fn decode_frame(bytes: &[u8]) -> Result<Frame> {
    let mut nodes = Node::decode_sequence(bytes)
        .map_err(|e| Error::Frame(format!("invalid DAG-CBOR: {e}")))?;
    if nodes.len() != 2 {
        return Err(Error::Frame(format!(
            "expected header and body, found {} values",
            nodes.len()
        )));
    }
    let body = nodes.pop().unwrap_or(Node::Null);
    let header = nodes.pop().unwrap_or(Node::Null);

    let op = header
        .get("op")
        .and_then(Node::as_i64)
        .ok_or_else(|| Error::Frame("header has no op".to_string()))?;

    match op {
        -1 => Err(Error::ErrorFrame {
            error: body.str_field("error").unwrap_or("Unknown").to_string(),
            message: body.str_field("message").map(str::to_string),
        }),
        1 => {
            let kind = header
                .str_field("t")
                .ok_or_else(|| Error::Frame("message header has no type".to_string()))?;
            if kind == "#commit" {
                decode_commit_body(body).map(Frame::Commit)
            } else {
                Ok(Frame::Other {
                    kind: kind.to_string(),
                    seq: body.get("seq").and_then(Node::as_i64),
                })
            }
        }
        other => Err(Error::Frame(format!("unknown frame op {other}"))),
    }
}

fn decode_commit_body(body: Node) -> Result<CommitMessage> {
    let kind = body.kind();
    let Node::Map(mut map) = body else {
        return Err(Error::Frame(format!(
            "commit body is a {kind}, expected a map"
        )));
    };

    let repo = match map.remove("repo") {
        Some(Node::Text(repo)) => repo,
        _ => return Err(Error::Frame("commit has no repo".to_string())),
    };

    // Move the archive out rather than copying it; it is the bulk of the frame.
    let blocks = match map.remove("blocks") {
        Some(Node::Bytes(bytes)) => bytes,
        _ => Vec::new(),
    };

    let ops = map
        .get("ops")
        .and_then(Node::as_list)
        .map(|items| items.iter().filter_map(decode_op).collect())
        .unwrap_or_default();

    Ok(CommitMessage {
        repo,
        blocks,
        ops,
        seq: int_field(&map, "seq"),
        rev: str_field(&map, "rev"),
        time: str_field(&map, "time"),
        too_big: map.get("tooBig").and_then(Node::as_bool).unwrap_or(false),
    })
}

/// Ops with an unknown action or no path are dropped.
fn decode_op(node: &Node) -> Option<Operation> {
    Some(Operation {
        action: Action::parse(node.str_field("action")?)?,
        path: node.str_field("path")?.to_string(),
        cid: node.get("cid").and_then(Node::as_link).cloned(),
    })
}

fn int_field(map: &BTreeMap<String, Node>, key: &str) -> Option<i64> {
    map.get(key).and_then(Node::as_i64)
}

fn str_field(map: &BTreeMap<String, Node>, key: &str) -> Option<String> {
    map.get(key).and_then(Node::as_str).map(str::to_string)
}
