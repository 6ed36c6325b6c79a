//! Block store decoder for CARv1 archives.
//!
//! Every commit ships its blocks as a CAR (content-addressed archive):
//!
//! ```text
//! [varint header_len][DAG-CBOR header {version: 1, roots: [link, ...]}]
//! [varint section_len][cid][block bytes]
//! [varint section_len][cid][block bytes]
//! ...
//! ```
//!
//! [`BlockStore`] indexes the sections by CID without copying: block slices
//! borrow from the archive, so the store lives exactly as long as the commit
//! message that carried it.

use crate::cid::{Cid, read_uvarint};
use crate::dagcbor::Node;
use crate::error::{Error, Result};
use std::collections::HashMap;

/// CID-addressed view over one archive.
#[derive(Debug)]
pub struct BlockStore<'a> {
    roots: Vec<Cid>,
    blocks: HashMap<Cid, &'a [u8]>,
}

impl<'a> BlockStore<'a> {
    /// Parse a CARv1 archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArchiveDecode`] if the header or any section is
    /// malformed. A single bad section invalidates the whole archive.
    pub fn from_car(archive: &'a [u8]) -> Result<Self> {
        let mut pos = 0;

        let header_len = read_uvarint(archive, &mut pos)
            .map_err(|e| Error::ArchiveDecode(format!("header length: {e}")))?
            as usize;
        let header_end = section_end(archive, pos, header_len, "header")?;
        let header = Node::decode(&archive[pos..header_end])
            .map_err(|e| Error::ArchiveDecode(format!("header: {e}")))?;
        let roots = parse_header(&header)?;
        pos = header_end;

        let mut blocks = HashMap::new();
        while pos < archive.len() {
            let section_start = pos;
            let section_len = read_uvarint(archive, &mut pos).map_err(|e| {
                Error::ArchiveDecode(format!("section length at offset {section_start}: {e}"))
            })? as usize;
            if section_len == 0 {
                return Err(Error::ArchiveDecode(format!(
                    "empty section at offset {section_start}"
                )));
            }

            let end = section_end(archive, pos, section_len, "section")?;
            let section = &archive[pos..end];
            let (cid, used) = Cid::read_prefix(section).map_err(|e| {
                Error::ArchiveDecode(format!("section CID at offset {section_start}: {e}"))
            })?;

            // Duplicates carry identical content by definition; keep the first.
            blocks.entry(cid).or_insert(&section[used..]);
            pos = end;
        }

        Ok(Self { roots, blocks })
    }

    /// Raw bytes for `cid`, if the archive carried that block.
    pub fn get(&self, cid: &Cid) -> Option<&'a [u8]> {
        self.blocks.get(cid).copied()
    }

    /// Root CIDs declared in the header (the signed commit, for firehose archives).
    pub fn roots(&self) -> &[Cid] {
        &self.roots
    }

    /// Number of distinct blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }
}

fn section_end(archive: &[u8], start: usize, len: usize, what: &str) -> Result<usize> {
    start
        .checked_add(len)
        .filter(|end| *end <= archive.len())
        .ok_or_else(|| {
            Error::ArchiveDecode(format!(
                "{what} of {len} bytes at offset {start} runs past end of archive ({} bytes)",
                archive.len()
            ))
        })
}

fn parse_header(header: &Node) -> Result<Vec<Cid>> {
    if header.as_map().is_none() {
        return Err(Error::ArchiveDecode(format!(
            "header is a {}, expected a map",
            header.kind()
        )));
    }

    match header.get("version").and_then(Node::as_i64) {
        Some(1) => {}
        Some(v) => {
            return Err(Error::ArchiveDecode(format!("unsupported CAR version {v}")));
        }
        None => {
            return Err(Error::ArchiveDecode("header has no version".to_string()));
        }
    }

    let roots = header
        .get("roots")
        .and_then(Node::as_list)
        .map(|items| items.iter().filter_map(Node::as_link).cloned().collect())
        .unwrap_or_default();

    Ok(roots)
}
