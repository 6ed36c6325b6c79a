//! Record resolver for post blocks.
//!
//! A create-operation names a CID; [`resolve`] finds that block in the
//! commit's archive and decodes it into a [`PostRecord`]. Decoding is
//! schema-tolerant: every field is an `Option`, a field of the wrong type
//! counts as absent, and unknown fields are ignored. Only a block that is not
//! a post at all (or not DAG-CBOR at all) is an error.

use crate::car::BlockStore;
use crate::cid::Cid;
use crate::dagcbor::Node;
use crate::error::RecordError;

/// Lexicon type of post records.
pub const POST_RECORD_TYPE: &str = "app.bsky.feed.post";

/// A post record as it appears in the repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostRecord {
    pub text: Option<String>,
    pub created_at: Option<String>,
    pub reply: Option<ReplyRef>,
    pub embed: Option<Embed>,
    pub facets: Option<Vec<Facet>>,
    pub langs: Option<Vec<String>>,
}

/// `com.atproto.repo.strongRef`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrongRef {
    pub uri: Option<String>,
    pub cid: Option<String>,
}

/// Reply linkage: the thread root and the direct parent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyRef {
    pub root: Option<StrongRef>,
    pub parent: Option<StrongRef>,
}

/// Embedded content. Each member is filled when the embed carries that shape.
///
/// `record` is normalized: both a plain quote (`embed.record = strongRef`)
/// and a quote-with-media (`embed.record = {record: strongRef}`) land here.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Embed {
    pub images: Option<Vec<Image>>,
    pub external: Option<External>,
    pub record: Option<StrongRef>,
    pub video: Option<Video>,
    /// Media half of a `recordWithMedia` embed.
    pub media: Option<Box<Embed>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Image {
    pub alt: Option<String>,
    pub image: Option<BlobRef>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct External {
    pub uri: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Video {
    pub alt: Option<String>,
    pub video: Option<BlobRef>,
}

/// Reference to an uploaded blob.
#[derive(Debug, Clone, PartialEq)]
pub struct BlobRef {
    /// Textual CID of the blob.
    pub cid: String,
    pub mime_type: Option<String>,
}

/// A rich-text annotation over a byte range of the text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Facet {
    pub features: Vec<FacetFeature>,
}

/// One facet feature. Which field is set tells what the feature is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FacetFeature {
    pub did: Option<String>,
    pub uri: Option<String>,
    pub tag: Option<String>,
}

/// Resolve the block at `cid` into a post record.
///
/// # Errors
///
/// - [`RecordError::MissingBlock`] if the archive does not carry `cid`
/// - [`RecordError::Malformed`] if the block is not valid DAG-CBOR
/// - [`RecordError::SchemaMismatch`] if the block is not a post
pub fn resolve(cid: &Cid, blocks: &BlockStore<'_>) -> Result<PostRecord, RecordError> {
    let raw = blocks
        .get(cid)
        .ok_or_else(|| RecordError::MissingBlock(cid.clone()))?;

    let node = Node::decode(raw).map_err(|e| RecordError::Malformed {
        cid: cid.clone(),
        reason: e.to_string(),
    })?;

    PostRecord::from_node(&node).map_err(|reason| RecordError::SchemaMismatch {
        cid: cid.clone(),
        reason,
    })
}

impl PostRecord {
    /// Build a post from a decoded record.
    ///
    /// Fails only when the value is not a map or declares a `$type` other
    /// than [`POST_RECORD_TYPE`]. A missing `$type` is accepted.
    pub fn from_node(node: &Node) -> Result<Self, String> {
        if node.as_map().is_none() {
            return Err(format!("expected a map, found {}", node.kind()));
        }

        if let Some(ty) = node.get("$type") {
            match ty.as_str() {
                Some(POST_RECORD_TYPE) => {}
                Some(other) => return Err(format!("record type is {other}")),
                None => return Err(format!("$type is a {}", ty.kind())),
            }
        }

        Ok(Self {
            text: owned_str(node, "text"),
            created_at: owned_str(node, "createdAt"),
            reply: node.get("reply").and_then(ReplyRef::from_node),
            embed: node.get("embed").and_then(Embed::from_node),
            facets: node
                .get("facets")
                .and_then(Node::as_list)
                .map(|items| items.iter().filter_map(Facet::from_node).collect()),
            langs: node.get("langs").and_then(Node::as_list).map(|items| {
                items
                    .iter()
                    .filter_map(Node::as_str)
                    .map(str::to_string)
                    .collect()
            }),
        })
    }

    /// The text, when it is present and non-empty.
    pub fn candidate_text(&self) -> Option<&str> {
        self.text.as_deref().filter(|t| !t.is_empty())
    }
}

impl StrongRef {
    fn from_node(node: &Node) -> Option<Self> {
        node.as_map()?;
        Some(Self {
            uri: owned_str(node, "uri"),
            // Lexicon says string; accept a link too.
            cid: owned_str(node, "cid")
                .or_else(|| node.get("cid").and_then(Node::as_link).map(Cid::to_string)),
        })
    }
}

impl ReplyRef {
    fn from_node(node: &Node) -> Option<Self> {
        node.as_map()?;
        Some(Self {
            root: node.get("root").and_then(StrongRef::from_node),
            parent: node.get("parent").and_then(StrongRef::from_node),
        })
    }
}

impl Embed {
    fn from_node(node: &Node) -> Option<Self> {
        Self::from_node_at(node, 0)
    }

    fn from_node_at(node: &Node, depth: usize) -> Option<Self> {
        node.as_map()?;

        let images = node.get("images").and_then(Node::as_list).map(|items| {
            items
                .iter()
                .filter(|item| item.as_map().is_some())
                .map(|item| Image {
                    alt: owned_str(item, "alt"),
                    image: item.get("image").and_then(BlobRef::from_node),
                })
                .collect()
        });

        let external = node.get("external").filter(|n| n.as_map().is_some()).map(|ext| External {
            uri: owned_str(ext, "uri"),
            title: owned_str(ext, "title"),
            description: owned_str(ext, "description"),
        });

        let record = node.get("record").and_then(|rec| {
            if rec.get("uri").is_some() {
                StrongRef::from_node(rec)
            } else {
                rec.get("record").and_then(StrongRef::from_node)
            }
        });

        let video = node.get("video").and_then(BlobRef::from_node).map(|blob| Video {
            alt: owned_str(node, "alt"),
            video: Some(blob),
        });

        // recordWithMedia nests one level; anything deeper is not a real shape.
        let media = if depth == 0 {
            node.get("media")
                .and_then(|m| Self::from_node_at(m, depth + 1))
                .map(Box::new)
        } else {
            None
        };

        Some(Self {
            images,
            external,
            record,
            video,
            media,
        })
    }
}

impl BlobRef {
    fn from_node(node: &Node) -> Option<Self> {
        node.as_map()?;
        let cid = node
            .get("ref")
            .and_then(Node::as_link)
            .map(Cid::to_string)
            .or_else(|| owned_str(node, "cid"))?;
        Some(Self {
            cid,
            mime_type: owned_str(node, "mimeType"),
        })
    }
}

impl Facet {
    fn from_node(node: &Node) -> Option<Self> {
        let features = node.get("features")?.as_list()?;
        Some(Self {
            features: features
                .iter()
                .filter(|f| f.as_map().is_some())
                .map(|f| FacetFeature {
                    did: owned_str(f, "did"),
                    uri: owned_str(f, "uri"),
                    tag: owned_str(f, "tag"),
                })
                .collect(),
        })
    }
}

fn owned_str(node: &Node, key: &str) -> Option<String> {
    node.str_field(key).map(str::to_string)
}
