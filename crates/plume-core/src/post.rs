//! The persisted unit: one keyword match with its extracted structure.

use crate::commit::{CommitMessage, Operation};
use crate::extract::{EmbedData, EnrichedPost, FacetData, ReplyTo};
use crate::keywords::KeywordMatch;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Format of [`MatchedPost::detected_at`], in local time.
pub const DETECTED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A post that matched at least one keyword.
///
/// Optional categories are omitted from the JSON when absent, never written
/// as `null` or empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedPost {
    /// Detection time, formatted with [`DETECTED_AT_FORMAT`].
    #[serde(rename = "timestamp_coletado")]
    pub detected_at: String,
    pub author_did: String,
    pub text: String,
    /// Never empty.
    pub keywords_found: Vec<String>,
    pub post_uri: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeds: Option<EmbedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub languages: Option<Vec<String>>,

    /// CID of the record block.
    pub cid: String,
    /// `collection/rkey` within the author's repository.
    pub path: String,
}

impl MatchedPost {
    /// Assemble a match for `op` of `commit`.
    ///
    /// Taking a [`KeywordMatch`] rather than a plain list keeps the keyword
    /// list non-empty.
    pub fn new(
        commit: &CommitMessage,
        op: &Operation,
        text: String,
        keywords: KeywordMatch,
        enriched: EnrichedPost,
        detected_at: DateTime<Local>,
    ) -> Self {
        Self {
            detected_at: detected_at.format(DETECTED_AT_FORMAT).to_string(),
            author_did: commit.repo.clone(),
            text,
            keywords_found: keywords.into_inner(),
            post_uri: commit.record_uri(&op.path),
            created_at: enriched.created_at,
            reply_to: enriched.reply_to,
            embeds: enriched.embeds,
            facets: enriched.facets,
            languages: enriched.languages,
            cid: op.cid.as_ref().map(ToString::to_string).unwrap_or_default(),
            path: op.path.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::Cid;
    use crate::commit::Action;
    use crate::extract::ImageData;
    use crate::keywords::KeywordFilter;
    use chrono::TimeZone;

    fn fixture(enriched: EnrichedPost) -> MatchedPost {
        let commit = CommitMessage {
            repo: "did:plc:alice".to_string(),
            ..Default::default()
        };
        let op = Operation {
            action: Action::Create,
            path: "app.bsky.feed.post/3kabc".to_string(),
            cid: Some(Cid::dag_cbor_sha256([9; 32])),
        };
        let keywords = KeywordFilter::new(["Pesquisa"])
            .unwrap()
            .find("Pesquisa sobre clima")
            .unwrap();
        let detected_at = Local.with_ymd_and_hms(2024, 5, 1, 9, 30, 5).unwrap();
        MatchedPost::new(
            &commit,
            &op,
            "Pesquisa sobre clima".to_string(),
            keywords,
            enriched,
            detected_at,
        )
    }

    #[test]
    fn test_new_fills_identity_fields() {
        let post = fixture(EnrichedPost::default());
        assert_eq!(post.detected_at, "2024-05-01 09:30:05");
        assert_eq!(post.author_did, "did:plc:alice");
        assert_eq!(post.post_uri, "at://did:plc:alice/app.bsky.feed.post/3kabc");
        assert_eq!(post.keywords_found, vec!["Pesquisa"]);
        assert_eq!(post.path, "app.bsky.feed.post/3kabc");
        assert!(post.cid.starts_with('b'));
    }

    #[test]
    fn test_absent_categories_are_omitted() {
        let json = serde_json::to_value(fixture(EnrichedPost::default())).unwrap();
        let obj = json.as_object().unwrap();
        for key in ["created_at", "reply_to", "embeds", "facets", "languages"] {
            assert!(!obj.contains_key(key), "{key} should be omitted");
        }
        for key in [
            "timestamp_coletado",
            "author_did",
            "text",
            "keywords_found",
            "post_uri",
            "cid",
            "path",
        ] {
            assert!(obj.contains_key(key), "{key} should be present");
        }
    }

    #[test]
    fn test_json_roundtrip() {
        let post = fixture(EnrichedPost {
            created_at: Some("2024-05-01T12:00:00.000Z".to_string()),
            reply_to: Some(ReplyTo {
                root: Some("at://did:plc:bob/app.bsky.feed.post/1".to_string()),
                parent: None,
            }),
            embeds: Some(EmbedData {
                images: Some(vec![ImageData {
                    alt: "a chart".to_string(),
                    image_cid: Some("bafkreiabc".to_string()),
                }]),
                ..Default::default()
            }),
            facets: Some(FacetData {
                tags: vec!["clima".to_string()],
                ..Default::default()
            }),
            languages: Some(vec!["pt".to_string()]),
        });

        let json = serde_json::to_string_pretty(&post).unwrap();
        assert!(json.contains("\"timestamp_coletado\""));
        let parsed: MatchedPost = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, post);
    }
}
