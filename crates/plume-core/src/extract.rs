//! Structured extraction from resolved posts.
//!
//! [`extract`] flattens the optional parts of a [`PostRecord`] into the shapes
//! persisted with each match. Every category is probed independently and
//! omitted when empty, so a post with no embeds, facets, reply or languages
//! simply yields an [`EnrichedPost`] full of `None`.

use crate::record::{BlobRef, Embed, Facet, PostRecord, StrongRef};
use serde::{Deserialize, Serialize};

/// Secondary structure pulled out of a post.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedPost {
    pub created_at: Option<String>,
    pub reply_to: Option<ReplyTo>,
    pub embeds: Option<EmbedData>,
    pub facets: Option<FacetData>,
    pub languages: Option<Vec<String>>,
}

/// Thread linkage of a reply, as URIs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyTo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbedData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub images: Option<Vec<ImageData>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external: Option<ExternalData>,
    /// Quoted record.
    #[serde(rename = "record", default, skip_serializing_if = "Option::is_none")]
    pub quoted_record: Option<QuotedRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<VideoData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageData {
    #[serde(default)]
    pub alt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_cid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalData {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedRecord {
    pub uri: String,
    #[serde(default)]
    pub cid: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_cid: Option<String>,
}

/// Mentions, links and hashtags, each deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetData {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl FacetData {
    pub fn is_empty(&self) -> bool {
        self.mentions.is_empty() && self.links.is_empty() && self.tags.is_empty()
    }
}

impl EmbedData {
    pub fn is_empty(&self) -> bool {
        self.images.is_none()
            && self.external.is_none()
            && self.quoted_record.is_none()
            && self.video.is_none()
    }
}

/// Extract embeds, facets, reply linkage and languages from a post.
pub fn extract(record: &PostRecord) -> EnrichedPost {
    EnrichedPost {
        created_at: record.created_at.clone(),
        reply_to: record.reply.as_ref().and_then(|reply| {
            let root = reply.root.as_ref().and_then(|r| r.uri.clone());
            let parent = reply.parent.as_ref().and_then(|r| r.uri.clone());
            (root.is_some() || parent.is_some()).then_some(ReplyTo { root, parent })
        }),
        embeds: record.embed.as_ref().map(extract_embed).filter(|e| !e.is_empty()),
        facets: record
            .facets
            .as_deref()
            .map(extract_facets)
            .filter(|f| !f.is_empty()),
        languages: record.langs.clone().filter(|langs| !langs.is_empty()),
    }
}

fn extract_embed(embed: &Embed) -> EmbedData {
    let mut data = EmbedData {
        quoted_record: embed.record.as_ref().and_then(quoted_record),
        ..Default::default()
    };
    fill_media(embed, &mut data);
    if let Some(media) = &embed.media {
        fill_media(media, &mut data);
    }
    data
}

fn fill_media(embed: &Embed, data: &mut EmbedData) {
    if data.images.is_none() {
        data.images = embed
            .images
            .as_ref()
            .map(|images| {
                images
                    .iter()
                    .map(|img| ImageData {
                        alt: img.alt.clone().unwrap_or_default(),
                        image_cid: img.image.as_ref().map(blob_cid),
                    })
                    .collect::<Vec<_>>()
            })
            .filter(|images| !images.is_empty());
    }

    if data.external.is_none() {
        data.external = embed.external.as_ref().map(|ext| ExternalData {
            uri: ext.uri.clone().unwrap_or_default(),
            title: ext.title.clone().unwrap_or_default(),
            description: ext.description.clone().unwrap_or_default(),
        });
    }

    if data.video.is_none() {
        data.video = embed.video.as_ref().map(|video| VideoData {
            alt: video.alt.clone(),
            video_cid: video.video.as_ref().map(blob_cid),
        });
    }
}

fn quoted_record(strong: &StrongRef) -> Option<QuotedRecord> {
    Some(QuotedRecord {
        uri: strong.uri.clone()?,
        cid: strong.cid.clone().unwrap_or_default(),
    })
}

fn blob_cid(blob: &BlobRef) -> String {
    blob.cid.clone()
}

/// Classify facet features. A feature lands in exactly one category, chosen
/// by the first field it carries in the order `did` (mention), `uri` (link),
/// `tag`.
fn extract_facets(facets: &[Facet]) -> FacetData {
    let mut data = FacetData::default();

    for feature in facets.iter().flat_map(|f| &f.features) {
        let (bucket, value) = if let Some(did) = &feature.did {
            (&mut data.mentions, did)
        } else if let Some(uri) = &feature.uri {
            (&mut data.links, uri)
        } else if let Some(tag) = &feature.tag {
            (&mut data.tags, tag)
        } else {
            continue;
        };

        if !bucket.contains(value) {
            bucket.push(value.clone());
        }
    }

    data
}
