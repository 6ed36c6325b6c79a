//! Fixture builders for tests: DAG-CBOR records, CAR archives and firehose frames.
//!
//! CIDs are real sha2-256 CIDv1s over the encoded block, so archives built
//! here are indistinguishable from relay output as far as the decoders care.

use crate::cid::{Cid, write_uvarint};
use crate::commit::{Action, CommitMessage, Operation, POST_COLLECTION};
use crate::dagcbor::Node;
use crate::record::POST_RECORD_TYPE;
use sha2::{Digest, Sha256};

/// Fixed creation time used by [`post_node`].
pub const CREATED_AT: &str = "2024-05-01T12:00:00.000Z";

pub fn text(s: &str) -> Node {
    Node::Text(s.to_string())
}

pub fn map(entries: Vec<(&str, Node)>) -> Node {
    Node::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// A minimal post record with `text` and a fixed `createdAt`.
pub fn post_node(body: &str) -> Node {
    map(vec![
        ("$type", text(POST_RECORD_TYPE)),
        ("text", text(body)),
        ("createdAt", text(CREATED_AT)),
    ])
}

/// CID of arbitrary block bytes.
pub fn cid_of(bytes: &[u8]) -> Cid {
    Cid::dag_cbor_sha256(Sha256::digest(bytes).into())
}

/// Encode a node and address it.
pub fn block(node: &Node) -> (Cid, Vec<u8>) {
    let bytes = node.encode().unwrap();
    (cid_of(&bytes), bytes)
}

/// Assemble a CARv1 archive.
pub fn car(roots: &[Cid], blocks: &[(Cid, Vec<u8>)]) -> Vec<u8> {
    let header = map(vec![
        ("version", Node::Integer(1)),
        (
            "roots",
            Node::List(roots.iter().cloned().map(Node::Link).collect()),
        ),
    ])
    .encode()
    .unwrap();

    let mut out = Vec::new();
    write_uvarint(header.len() as u64, &mut out);
    out.extend_from_slice(&header);
    for (cid, data) in blocks {
        write_uvarint((cid.as_bytes().len() + data.len()) as u64, &mut out);
        out.extend_from_slice(cid.as_bytes());
        out.extend_from_slice(data);
    }
    out
}

/// Builds one commit: ops plus the archive carrying their blocks.
#[derive(Debug, Clone)]
pub struct CommitBuilder {
    repo: String,
    seq: Option<i64>,
    blocks: Vec<(Cid, Vec<u8>)>,
    ops: Vec<Operation>,
}

impl CommitBuilder {
    pub fn new(repo: &str) -> Self {
        Self {
            repo: repo.to_string(),
            seq: None,
            blocks: Vec::new(),
            ops: Vec::new(),
        }
    }

    pub fn seq(mut self, seq: i64) -> Self {
        self.seq = Some(seq);
        self
    }

    /// Create a post with the given text at `app.bsky.feed.post/<rkey>`.
    pub fn post(self, rkey: &str, body: &str) -> Self {
        self.create_record(&format!("{POST_COLLECTION}/{rkey}"), &post_node(body))
    }

    /// Create an arbitrary record at `path`, with its block in the archive.
    pub fn create_record(self, path: &str, node: &Node) -> Self {
        self.create_raw(path, node.encode().unwrap())
    }

    /// Create a record whose block is the given bytes, valid or not.
    pub fn create_raw(mut self, path: &str, bytes: Vec<u8>) -> Self {
        let cid = cid_of(&bytes);
        self.blocks.push((cid.clone(), bytes));
        self.op(Operation {
            action: Action::Create,
            path: path.to_string(),
            cid: Some(cid),
        })
    }

    /// Create a post whose block the archive does not carry.
    pub fn missing_block(self, rkey: &str) -> Self {
        let cid = cid_of(format!("absent:{rkey}").as_bytes());
        self.op(Operation {
            action: Action::Create,
            path: format!("{POST_COLLECTION}/{rkey}"),
            cid: Some(cid),
        })
    }

    pub fn op(mut self, op: Operation) -> Self {
        self.ops.push(op);
        self
    }

    pub fn build(self) -> CommitMessage {
        let roots: Vec<Cid> = self.blocks.first().map(|(c, _)| c.clone()).into_iter().collect();
        CommitMessage {
            blocks: car(&roots, &self.blocks),
            repo: self.repo,
            ops: self.ops,
            seq: self.seq,
            rev: Some("3kxyz".to_string()),
            time: Some(CREATED_AT.to_string()),
            too_big: false,
        }
    }

    /// Encode as a `#commit` firehose frame.
    pub fn frame(self) -> Vec<u8> {
        commit_frame(&self.build())
    }
}

/// Encode a commit message as a `#commit` firehose frame.
pub fn commit_frame(commit: &CommitMessage) -> Vec<u8> {
    let ops = commit
        .ops
        .iter()
        .map(|op| {
            map(vec![
                ("action", text(op.action.as_str())),
                ("path", text(&op.path)),
                ("cid", op.cid.clone().map_or(Node::Null, Node::Link)),
            ])
        })
        .collect();

    let mut body = vec![
        ("repo", text(&commit.repo)),
        ("blocks", Node::Bytes(commit.blocks.clone())),
        ("ops", Node::List(ops)),
        ("tooBig", Node::Bool(commit.too_big)),
    ];
    if let Some(seq) = commit.seq {
        body.push(("seq", Node::Integer(seq.into())));
    }
    if let Some(rev) = &commit.rev {
        body.push(("rev", text(rev)));
    }
    if let Some(time) = &commit.time {
        body.push(("time", text(time)));
    }

    frame(
        map(vec![("op", Node::Integer(1)), ("t", text("#commit"))]),
        map(body),
    )
}

/// An `#info` frame, which carries no commit.
pub fn info_frame(name: &str) -> Vec<u8> {
    frame(
        map(vec![("op", Node::Integer(1)), ("t", text("#info"))]),
        map(vec![("name", text(name))]),
    )
}

/// An error frame (`op == -1`).
pub fn error_frame(error: &str, message: &str) -> Vec<u8> {
    frame(
        map(vec![("op", Node::Integer(-1))]),
        map(vec![("error", text(error)), ("message", text(message))]),
    )
}

fn frame(header: Node, body: Node) -> Vec<u8> {
    let mut bytes = header.encode().unwrap();
    bytes.extend(body.encode().unwrap());
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::car::BlockStore;
    use crate::commit::{Frame, decode_frame};
    use crate::record::resolve;

    #[test]
    fn test_built_commit_resolves() {
        let commit = CommitBuilder::new("did:plc:alice").post("a", "hello").build();
        let store = BlockStore::from_car(&commit.blocks).unwrap();
        let cid = commit.ops[0].cid.as_ref().unwrap();
        assert_eq!(store.roots(), std::slice::from_ref(cid));
        let record = resolve(cid, &store).unwrap();
        assert_eq!(record.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_frame_decodes_to_same_commit() {
        let commit = CommitBuilder::new("did:plc:alice")
            .seq(7)
            .post("a", "hello")
            .missing_block("b")
            .build();
        let Frame::Commit(decoded) = decode_frame(&commit_frame(&commit)).unwrap() else {
            panic!("expected a commit");
        };
        assert_eq!(decoded, commit);
    }
}
