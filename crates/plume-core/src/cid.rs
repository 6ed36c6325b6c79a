//! Content identifiers and unsigned varints.
//!
//! Blocks in a commit archive are keyed by CID. Two binary shapes exist:
//!
//! ```text
//! CIDv0: [0x12][0x20][32-byte sha2-256 digest]
//! CIDv1: varint(version=1) varint(codec) varint(hash code) varint(digest len) digest
//! ```
//!
//! The CID is kept as its raw binary form; equality and hashing are over
//! those bytes, which is exactly how blocks are addressed inside an archive.

use crate::error::{Error, Result};
use std::fmt;
use std::io::{self, Read};

/// Multicodec code for DAG-CBOR blocks.
pub const DAG_CBOR: u64 = 0x71;

/// Multicodec code for DAG-PB blocks (implied by CIDv0).
pub const DAG_PB: u64 = 0x70;

/// Multicodec code for raw binary blobs.
pub const RAW: u64 = 0x55;

/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

/// Unsigned varints are at most 9 bytes (63 bits) in multiformats.
const MAX_VARINT_LEN: usize = 9;

/// A content identifier.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    bytes: Vec<u8>,
}

impl Cid {
    /// Build a CIDv1 for a DAG-CBOR block from its sha2-256 digest.
    pub fn dag_cbor_sha256(digest: [u8; 32]) -> Self {
        let mut bytes = Vec::with_capacity(36);
        write_uvarint(1, &mut bytes);
        write_uvarint(DAG_CBOR, &mut bytes);
        write_uvarint(SHA2_256, &mut bytes);
        write_uvarint(32, &mut bytes);
        bytes.extend_from_slice(&digest);
        Self { bytes }
    }

    /// Parse a CID from the front of `input`, returning it and the bytes consumed.
    ///
    /// Used by the archive reader, where the CID is followed directly by block data.
    pub fn read_prefix(input: &[u8]) -> Result<(Self, usize)> {
        if input.first() == Some(&0x12) {
            if input.get(1) != Some(&0x20) || input.len() < 34 {
                return Err(Error::InvalidCid("truncated CIDv0".to_string()));
            }
            return Ok((
                Self {
                    bytes: input[..34].to_vec(),
                },
                34,
            ));
        }

        let mut pos = 0;
        let version = read_uvarint(input, &mut pos)?;
        if version != 1 {
            return Err(Error::InvalidCid(format!("unsupported CID version {version}")));
        }
        let _codec = read_uvarint(input, &mut pos)?;
        let _hash_code = read_uvarint(input, &mut pos)?;
        let digest_len = read_uvarint(input, &mut pos)? as usize;

        let end = pos
            .checked_add(digest_len)
            .filter(|end| *end <= input.len())
            .ok_or_else(|| {
                Error::InvalidCid(format!(
                    "digest of {digest_len} bytes exceeds remaining {} bytes",
                    input.len() - pos
                ))
            })?;

        Ok((
            Self {
                bytes: input[..end].to_vec(),
            },
            end,
        ))
    }

    /// Parse a CID that must span all of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (cid, used) = Self::read_prefix(bytes)?;
        if used != bytes.len() {
            return Err(Error::InvalidCid(format!(
                "{} trailing bytes after CID",
                bytes.len() - used
            )));
        }
        Ok(cid)
    }

    /// Raw binary form.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_v0(&self) -> bool {
        self.bytes.len() == 34 && self.bytes[0] == 0x12 && self.bytes[1] == 0x20
    }

    /// CID version (0 or 1).
    pub fn version(&self) -> u64 {
        if self.is_v0() { 0 } else { 1 }
    }

    /// Multicodec of the addressed content.
    pub fn codec(&self) -> u64 {
        if self.is_v0() {
            return DAG_PB;
        }
        // Both varints were validated on construction.
        self.read_codec().unwrap_or(0)
    }

    fn read_codec(&self) -> Option<u64> {
        let mut pos = 0;
        read_uvarint(&self.bytes, &mut pos).ok()?;
        read_uvarint(&self.bytes, &mut pos).ok()
    }
}

impl fmt::Display for Cid {
    /// CIDv1 renders as multibase base32-lower (`b...`), CIDv0 as bare base58btc (`Qm...`).
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_v0() {
            f.write_str(&base58btc(&self.bytes))
        } else {
            write!(f, "b{}", base32_lower(&self.bytes))
        }
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

/// Read an unsigned LEB128 varint starting at `*pos`, advancing `pos` past it.
pub fn read_uvarint(input: &[u8], pos: &mut usize) -> Result<u64> {
    let mut rest = input.get(*pos..).unwrap_or_default();
    let available = rest.len();

    match read_uvarint_from(&mut rest) {
        Ok(Some(value)) => {
            *pos += available - rest.len();
            Ok(value)
        }
        Ok(None) => Err(Error::InvalidCid("truncated varint".to_string())),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::InvalidCid("truncated varint".to_string()))
        }
        Err(_) => Err(Error::InvalidCid("varint too long".to_string())),
    }
}

/// Read an unsigned LEB128 varint from a stream.
///
/// Returns `Ok(None)` if the stream is already at end of input. Input that
/// ends inside the varint is `UnexpectedEof`; an over-long varint is
/// `InvalidData`.
pub fn read_uvarint_from<R: Read>(reader: &mut R) -> io::Result<Option<u64>> {
    let mut result: u64 = 0;

    for i in 0..MAX_VARINT_LEN {
        let mut byte = [0u8; 1];
        if reader.read(&mut byte)? == 0 {
            if i == 0 {
                return Ok(None);
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input ends inside a varint",
            ));
        }

        result |= u64::from(byte[0] & 0x7F) << (7 * i);
        if byte[0] & 0x80 == 0 {
            return Ok(Some(result));
        }
    }

    Err(io::Error::new(io::ErrorKind::InvalidData, "varint too long"))
}

/// Append `value` as an unsigned LEB128 varint.
pub fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push((value as u8) | 0x80);
        value >>= 7;
    }
    out.push(value as u8);
}

fn base32_lower(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 32] = b"abcdefghijklmnopqrstuvwxyz234567";

    let mut out = String::with_capacity((bytes.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        buffer = (buffer << 8) | byte as u32;
        bits += 8;
        while bits >= 5 {
            bits -= 5;
            out.push(ALPHABET[((buffer >> bits) & 31) as usize] as char);
        }
        buffer &= (1 << bits) - 1;
    }
    if bits > 0 {
        out.push(ALPHABET[((buffer << (5 - bits)) & 31) as usize] as char);
    }

    out
}

fn base58btc(bytes: &[u8]) -> String {
    const ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

    let zeros = bytes.iter().take_while(|&&b| b == 0).count();
    let mut digits: Vec<u8> = Vec::with_capacity(bytes.len() * 138 / 100 + 1);

    for &byte in &bytes[zeros..] {
        let mut carry = byte as u32;
        for digit in digits.iter_mut() {
            carry += (*digit as u32) << 8;
            *digit = (carry % 58) as u8;
            carry /= 58;
        }
        while carry > 0 {
            digits.push((carry % 58) as u8);
            carry /= 58;
        }
    }

    let mut out = String::with_capacity(zeros + digits.len());
    out.extend(std::iter::repeat_n('1', zeros));
    out.extend(digits.iter().rev().map(|&d| ALPHABET[d as usize] as char));
    out
}
