//! Feed normalization: raw activity-stream entries into display-ready items.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::api::{RawFeedPayload, RawItem, RawNews, RawPost, RawStreamItem};
use crate::error::ErrorKind;

/// Kind of a normalized feed item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    News,
    Post,
}

/// Kind-specific fields of a feed item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedDetails {
    /// Board-authored announcement.
    News {
        pinned: bool,
        topics: Vec<String>,
    },
    /// Neighbor-authored message.
    Post {
        author: Option<String>,
        category: Option<String>,
    },
}

/// One display-ready feed entry.
///
/// Produced fresh on every poll cycle and never mutated afterwards; a new
/// snapshot replaces the old one wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub created_at: DateTime<Utc>,
    pub thumbs_up_count: u32,
    pub comments_count: u32,
    pub body: String,
    #[serde(flatten)]
    pub details: FeedDetails,
}

impl FeedItem {
    pub fn kind(&self) -> FeedKind {
        match self.details {
            FeedDetails::News { .. } => FeedKind::News,
            FeedDetails::Post { .. } => FeedKind::Post,
        }
    }
}

/// The immutable result of one poll cycle.
///
/// On a failed cycle the previous items are retained and only `last_error`
/// and `fetched_at` move; `last_success_at` tells consumers how old the
/// retained data actually is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedSnapshot {
    pub items: Vec<FeedItem>,
    pub org_slug: String,
    /// When the last cycle finished, successful or not.
    pub fetched_at: DateTime<Utc>,
    /// When the current items were fetched.
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<ErrorKind>,
}

impl FeedSnapshot {
    /// The empty snapshot published before the first cycle completes.
    pub fn empty(org_slug: &str) -> Self {
        Self {
            items: Vec::new(),
            org_slug: org_slug.to_string(),
            fetched_at: Utc::now(),
            last_success_at: None,
            last_error: None,
        }
    }
}

/// Normalizes a raw payload into display-ready items.
///
/// Entries are kept in API order (already reverse-chronological upstream);
/// this function re-shapes, it never re-sorts. Entries with an unrecognized
/// type tag are dropped silently; entries missing title or slug are dropped
/// with a warning. Neither ever fails the cycle.
pub fn normalize(payload: RawFeedPayload) -> Vec<FeedItem> {
    payload
        .items
        .into_iter()
        .filter_map(normalize_entry)
        .collect()
}

fn normalize_entry(entry: RawStreamItem) -> Option<FeedItem> {
    let raw = entry.item?;
    let item = match serde_json::from_value::<RawItem>(raw) {
        Ok(item) => item,
        Err(err) => {
            debug!(error = %err, "dropping undecodable stream entry");
            return None;
        }
    };

    let created_at = entry
        .happened_at
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);

    match item {
        RawItem::News(news) => normalize_news(news, created_at),
        RawItem::Post(post) => normalize_post(post, created_at),
        RawItem::Unknown => {
            // Forward-compatible: new remote item types are ignored.
            None
        }
    }
}

fn normalize_news(news: RawNews, created_at: DateTime<Utc>) -> Option<FeedItem> {
    let (slug, title) = require_identity("News", news.slug, news.title)?;
    Some(FeedItem {
        id: slug.clone(),
        title,
        slug,
        created_at,
        thumbs_up_count: news.thumbs_up_count.unwrap_or(0),
        comments_count: news.comments_count.unwrap_or(0),
        body: news.ingress.unwrap_or_default(),
        details: FeedDetails::News {
            pinned: news.pinned.unwrap_or(false),
            topics: news
                .topics
                .into_iter()
                .filter_map(|topic| topic.title)
                .collect(),
        },
    })
}

fn normalize_post(post: RawPost, created_at: DateTime<Utc>) -> Option<FeedItem> {
    let (slug, title) = require_identity("Post", post.slug, post.title)?;
    Some(FeedItem {
        id: slug.clone(),
        title,
        slug,
        created_at,
        thumbs_up_count: post.thumbs_up_count.unwrap_or(0),
        comments_count: post.comments_count.unwrap_or(0),
        body: post.body.unwrap_or_default(),
        details: FeedDetails::Post {
            author: post.updated_by.and_then(|author| author.first_name),
            category: post.category.and_then(|category| category.label),
        },
    })
}

/// Both slug and title are required; an entry missing either is dropped.
fn require_identity(
    kind: &str,
    slug: Option<String>,
    title: Option<String>,
) -> Option<(String, String)> {
    match (slug, title) {
        (Some(slug), Some(title)) if !slug.is_empty() && !title.is_empty() => Some((slug, title)),
        (slug, _) => {
            warn!(
                kind,
                slug = slug.as_deref().unwrap_or("<missing>"),
                "dropping feed entry without slug/title"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(items: serde_json::Value) -> RawFeedPayload {
        serde_json::from_value(json!({ "items": items })).unwrap()
    }

    fn news_entry(slug: &str, title: &str) -> serde_json::Value {
        json!({
            "happenedAt": "2026-03-01T12:00:00Z",
            "item": {
                "__typename": "News",
                "slug": slug,
                "title": title,
                "ingress": "Styret informerer.",
                "pinned": false,
                "topics": [{"title": "Info"}],
                "commentsCount": 2,
                "thumbsUpCount": 5,
            }
        })
    }

    #[test]
    fn test_normalize_news_and_post() {
        let items = normalize(payload(json!([
            news_entry("dugnad", "Dugnad på lørdag"),
            {
                "happenedAt": "2026-02-28T08:30:00Z",
                "item": {
                    "__typename": "Post",
                    "slug": "stige",
                    "title": "Noen med stige?",
                    "body": "Trenger en stige i helgen.",
                    "category": {"label": "Spørsmål"},
                    "updatedBy": {"firstName": "Kari"},
                }
            },
        ])));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind(), FeedKind::News);
        assert_eq!(items[0].id, "dugnad");
        assert_eq!(items[0].thumbs_up_count, 5);
        assert_eq!(
            items[0].details,
            FeedDetails::News {
                pinned: false,
                topics: vec!["Info".to_string()],
            }
        );

        assert_eq!(items[1].kind(), FeedKind::Post);
        // missing counts default to zero
        assert_eq!(items[1].thumbs_up_count, 0);
        assert_eq!(items[1].comments_count, 0);
        assert_eq!(
            items[1].details,
            FeedDetails::Post {
                author: Some("Kari".to_string()),
                category: Some("Spørsmål".to_string()),
            }
        );
    }

    /// Unrecognized type tags are excluded without disturbing the order of
    /// the remaining entries.
    #[test]
    fn test_normalize_drops_unknown_kinds_preserving_order() {
        let items = normalize(payload(json!([
            news_entry("first", "First"),
            {
                "happenedAt": "2026-03-01T10:00:00Z",
                "item": {"__typename": "Poll", "question": "Garasjefarge?"}
            },
            news_entry("second", "Second"),
        ])));

        let slugs: Vec<&str> = items.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, ["first", "second"]);
    }

    /// A News entry without a title is dropped; everything else survives.
    #[test]
    fn test_normalize_drops_entry_missing_title() {
        let items = normalize(payload(json!([
            {
                "happenedAt": "2026-03-01T10:00:00Z",
                "item": {"__typename": "News", "slug": "untitled"}
            },
            news_entry("kept", "Kept"),
        ])));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].slug, "kept");
    }

    #[test]
    fn test_normalize_does_not_resort() {
        // API order is the contract, even when timestamps disagree with it.
        let items = normalize(payload(json!([
            {
                "happenedAt": "2026-01-01T00:00:00Z",
                "item": {"__typename": "News", "slug": "older", "title": "Older"}
            },
            {
                "happenedAt": "2026-02-01T00:00:00Z",
                "item": {"__typename": "News", "slug": "newer", "title": "Newer"}
            },
        ])));

        let slugs: Vec<&str> = items.iter().map(|item| item.slug.as_str()).collect();
        assert_eq!(slugs, ["older", "newer"]);
    }

    #[test]
    fn test_normalize_tolerates_missing_item_and_garbage() {
        let items = normalize(payload(json!([
            {"happenedAt": "2026-03-01T10:00:00Z"},
            {"happenedAt": "2026-03-01T10:00:00Z", "item": {"no_typename": true}},
            news_entry("kept", "Kept"),
        ])));

        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_feed_item_serializes_with_kind_tag() {
        let items = normalize(payload(json!([news_entry("dugnad", "Dugnad")])));
        let value = serde_json::to_value(&items[0]).unwrap();
        assert_eq!(value["kind"], "news");
        assert_eq!(value["pinned"], false);
        assert_eq!(value["slug"], "dugnad");
    }
}
