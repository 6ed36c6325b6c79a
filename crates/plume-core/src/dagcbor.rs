//! DAG-CBOR data model.
//!
//! Records, commit bodies and archive headers are all DAG-CBOR: a strict
//! subset of CBOR with string-keyed maps, no indefinite lengths, and CID
//! links carried as tag 42 over `0x00 ++ cid bytes`.
//!
//! Decoding goes through [`Node`], a small owned tree. Typed views (post
//! records, frame bodies) are built from it by looking fields up by name,
//! which keeps every schema field optional and ignores anything unknown.

use crate::cid::Cid;
use crate::error::{Error, Result};
use minicbor::data::{Int, Tag, Type};
use minicbor::{Decoder, Encoder};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// CBOR tag for CID links.
pub const CID_LINK_TAG: u64 = 42;

/// Maximum container nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 64;

/// A decoded DAG-CBOR value.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Integer(i128),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Link(Cid),
    List(Vec<Node>),
    Map(BTreeMap<String, Node>),
}

impl Node {
    /// Decode exactly one value spanning all of `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let node = decode_node(&mut dec, 0)?;
        if dec.position() != bytes.len() {
            return Err(Error::Cbor(format!(
                "{} trailing bytes after value",
                bytes.len() - dec.position()
            )));
        }
        Ok(node)
    }

    /// Decode a concatenation of values (e.g. a frame header followed by its body).
    pub fn decode_sequence(bytes: &[u8]) -> Result<Vec<Self>> {
        let mut dec = Decoder::new(bytes);
        let mut nodes = Vec::new();
        while dec.position() < bytes.len() {
            nodes.push(decode_node(&mut dec, 0)?);
        }
        Ok(nodes)
    }

    /// Encode with DAG-CBOR canonical map key order (length first, then bytewise).
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        encode_node(self, &mut Encoder::new(&mut buf))?;
        Ok(buf)
    }

    /// Look up a field of a map. Returns `None` for missing keys and non-maps.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_map().and_then(|map| map.get(key))
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Node::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&Cid> {
        match self {
            Node::Link(cid) => Some(cid),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Integer(i) => i64::try_from(*i).ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "bool",
            Node::Integer(_) => "integer",
            Node::Float(_) => "float",
            Node::Text(_) => "string",
            Node::Bytes(_) => "bytes",
            Node::Link(_) => "link",
            Node::List(_) => "list",
            Node::Map(_) => "map",
        }
    }

    /// String field of a map, if present and actually a string.
    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Node::as_str)
    }
}

fn decode_node(dec: &mut Decoder<'_>, depth: usize) -> Result<Node> {
    if depth > MAX_DEPTH {
        return Err(Error::Cbor(format!("nesting exceeds {MAX_DEPTH} levels")));
    }

    match dec.datatype()? {
        Type::Null => {
            dec.null()?;
            Ok(Node::Null)
        }
        Type::Bool => Ok(Node::Bool(dec.bool()?)),
        Type::U8
        | Type::U16
        | Type::U32
        | Type::U64
        | Type::I8
        | Type::I16
        | Type::I32
        | Type::I64
        | Type::Int => Ok(Node::Integer(i128::from(dec.int()?))),
        Type::F16 | Type::F32 => Err(Error::Cbor(
            "only 64-bit floats are allowed in DAG-CBOR".to_string(),
        )),
        Type::F64 => Ok(Node::Float(dec.f64()?)),
        Type::String => Ok(Node::Text(dec.str()?.to_string())),
        Type::Bytes => Ok(Node::Bytes(dec.bytes()?.to_vec())),
        Type::Array => {
            let len = dec
                .array()?
                .ok_or_else(|| Error::Cbor("indefinite-length array".to_string()))?;
            // Cap the preallocation; the length prefix is untrusted.
            let mut items = Vec::with_capacity(len.min(1024) as usize);
            for _ in 0..len {
                items.push(decode_node(dec, depth + 1)?);
            }
            Ok(Node::List(items))
        }
        Type::Map => {
            let len = dec
                .map()?
                .ok_or_else(|| Error::Cbor("indefinite-length map".to_string()))?;
            let mut map = BTreeMap::new();
            for _ in 0..len {
                if dec.datatype()? != Type::String {
                    return Err(Error::Cbor("map key is not a string".to_string()));
                }
                let key = dec.str()?.to_string();
                let value = decode_node(dec, depth + 1)?;
                if map.insert(key, value).is_some() {
                    return Err(Error::Cbor("duplicate map key".to_string()));
                }
            }
            Ok(Node::Map(map))
        }
        Type::Tag => {
            let tag = dec.tag()?;
            if tag.as_u64() != CID_LINK_TAG {
                return Err(Error::Cbor(format!("unsupported tag {}", tag.as_u64())));
            }
            let bytes = dec.bytes()?;
            match bytes.split_first() {
                Some((0x00, cid)) => Ok(Node::Link(Cid::from_bytes(cid)?)),
                _ => Err(Error::Cbor("CID link missing identity multibase prefix".to_string())),
            }
        }
        Type::StringIndef | Type::BytesIndef | Type::ArrayIndef | Type::MapIndef => {
            Err(Error::Cbor("indefinite-length item".to_string()))
        }
        other => Err(Error::Cbor(format!("unsupported CBOR type {other:?}"))),
    }
}

fn encode_node(node: &Node, enc: &mut Encoder<&mut Vec<u8>>) -> Result<()> {
    match node {
        Node::Null => {
            enc.null()?;
        }
        Node::Bool(b) => {
            enc.bool(*b)?;
        }
        Node::Integer(i) => {
            let int = Int::try_from(*i)
                .map_err(|_| Error::Cbor(format!("integer {i} out of CBOR range")))?;
            enc.int(int)?;
        }
        Node::Float(f) => {
            enc.f64(*f)?;
        }
        Node::Text(s) => {
            enc.str(s)?;
        }
        Node::Bytes(b) => {
            enc.bytes(b)?;
        }
        Node::Link(cid) => {
            let mut link = Vec::with_capacity(cid.as_bytes().len() + 1);
            link.push(0x00);
            link.extend_from_slice(cid.as_bytes());
            enc.tag(Tag::new(CID_LINK_TAG))?.bytes(&link)?;
        }
        Node::List(items) => {
            enc.array(items.len() as u64)?;
            for item in items {
                encode_node(item, enc)?;
            }
        }
        Node::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|(a, _), (b, _)| match a.len().cmp(&b.len()) {
                Ordering::Equal => a.as_bytes().cmp(b.as_bytes()),
                other => other,
            });
            enc.map(entries.len() as u64)?;
            for (key, value) in entries {
                enc.str(key)?;
                encode_node(value, enc)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(entries: &[(&str, Node)]) -> Node {
        Node::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_decode_nested_record() {
        let cid = Cid::dag_cbor_sha256([3; 32]);
        let node = map(&[
            ("text", Node::Text("olá".into())),
            ("count", Node::Integer(-5)),
            ("big", Node::Integer(70_000)),
            ("link", Node::Link(cid.clone())),
            ("langs", Node::List(vec![Node::Text("pt".into())])),
            ("nothing", Node::Null),
        ]);

        let decoded = Node::decode(&node.encode().unwrap()).unwrap();
        assert_eq!(decoded, node);
        assert_eq!(decoded.str_field("text"), Some("olá"));
        assert_eq!(decoded.get("count").and_then(Node::as_i64), Some(-5));
        assert_eq!(decoded.get("link").and_then(Node::as_link), Some(&cid));
    }

    #[test]
    fn test_canonical_key_order() {
        let node = map(&[("bb", Node::Null), ("a", Node::Null), ("c", Node::Null)]);
        let bytes = node.encode().unwrap();
        // map(3), "a", null, "c", null, "bb", null
        assert_eq!(
            bytes,
            vec![0xa3, 0x61, b'a', 0xf6, 0x61, b'c', 0xf6, 0x62, b'b', b'b', 0xf6]
        );
    }

    #[test]
    fn test_rejects_indefinite_length() {
        // Indefinite-length array [1]
        assert!(Node::decode(&[0x9f, 0x01, 0xff]).is_err());
    }

    #[test]
    fn test_rejects_non_string_key() {
        // {1: 2}
        assert!(Node::decode(&[0xa1, 0x01, 0x02]).is_err());
    }

    #[test]
    fn test_rejects_unknown_tag() {
        // tag(1) 0
        assert!(Node::decode(&[0xc1, 0x00]).is_err());
    }

    #[test]
    fn test_rejects_link_without_prefix() {
        let cid = Cid::dag_cbor_sha256([3; 32]);
        let mut bytes = Vec::new();
        Encoder::new(&mut bytes)
            .tag(Tag::new(CID_LINK_TAG))
            .unwrap()
            .bytes(cid.as_bytes())
            .unwrap();
        assert!(Node::decode(&bytes).is_err());
    }

    #[test]
    fn test_link_encoding_layout() {
        let cid = Cid::dag_cbor_sha256([3; 32]);
        let bytes = Node::Link(cid.clone()).encode().unwrap();
        // tag(42), bytes(37), 0x00 prefix, then the CID
        assert_eq!(&bytes[..4], &[0xd8, 0x2a, 0x58, 0x25]);
        assert_eq!(&bytes[4..], &[&[0x00], cid.as_bytes()].concat()[..]);
    }

    #[test]
    fn test_float_is_always_64_bit() {
        let bytes = Node::Float(1.5).encode().unwrap();
        assert_eq!(bytes[0], 0xfb);
        assert_eq!(bytes.len(), 9);
        assert_eq!(Node::decode(&bytes).unwrap(), Node::Float(1.5));
    }

    #[test]
    fn test_rejects_short_floats() {
        // f32 1.5
        assert!(matches!(
            Node::decode(&[0xfa, 0x3f, 0xc0, 0x00, 0x00]),
            Err(Error::Cbor(_))
        ));
        // f16 1.5
        assert!(matches!(
            Node::decode(&[0xf9, 0x3e, 0x00]),
            Err(Error::Cbor(_))
        ));
    }

    #[test]
    fn test_integer_boundaries() {
        let node = Node::List(vec![
            Node::Integer(23),
            Node::Integer(24),
            Node::Integer(-1),
            Node::Integer(i128::from(u64::MAX)),
        ]);
        let bytes = node.encode().unwrap();
        assert_eq!(&bytes[..5], &[0x84, 0x17, 0x18, 0x18, 0x20]);
        assert_eq!(Node::decode(&bytes).unwrap(), node);

        assert!(Node::Integer(i128::from(u64::MAX) + 1).encode().is_err());
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        assert!(Node::decode(&[0xf6, 0xf6]).is_err());
    }

    #[test]
    fn test_rejects_excessive_nesting() {
        let mut bytes = vec![0x81; MAX_DEPTH + 2];
        bytes.push(0xf6);
        assert!(Node::decode(&bytes).is_err());
    }

    #[test]
    fn test_decode_sequence() {
        let mut bytes = map(&[("op", Node::Integer(1))]).encode().unwrap();
        bytes.extend(map(&[("seq", Node::Integer(7))]).encode().unwrap());

        let nodes = Node::decode_sequence(&bytes).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].get("seq").and_then(Node::as_i64), Some(7));
    }

    #[test]
    fn test_truncated_input_errors() {
        let bytes = map(&[("text", Node::Text("hello".into()))]).encode().unwrap();
        assert!(Node::decode(&bytes[..bytes.len() - 2]).is_err());
    }
}
