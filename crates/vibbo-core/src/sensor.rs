//! Sensor-state projection of a feed snapshot.
//!
//! This is the host entity surface: one primary value (the newest item's
//! title, truncated for display) plus the full item list and organization
//! slug as extended attributes.

use serde::Serialize;

use crate::feed::{FeedItem, FeedSnapshot};

/// Display length cap for the primary value.
pub const MAX_VALUE_LEN: usize = 50;

const NO_DATA: &str = "No Data";

/// What the host wraps as a sensor entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    /// Newest item title, truncated to [`MAX_VALUE_LEN`] characters.
    pub value: String,
    /// Full normalized item sequence.
    pub items: Vec<FeedItem>,
    pub organization_slug: String,
}

impl SensorState {
    pub fn from_snapshot(snapshot: &FeedSnapshot) -> Self {
        let value = snapshot
            .items
            .first()
            .map_or_else(|| NO_DATA.to_string(), |item| truncate_title(&item.title));

        Self {
            value,
            items: snapshot.items.clone(),
            organization_slug: snapshot.org_slug.clone(),
        }
    }
}

fn truncate_title(title: &str) -> String {
    if title.chars().count() <= MAX_VALUE_LEN {
        return title.to_string();
    }
    let truncated: String = title.chars().take(MAX_VALUE_LEN).collect();
    format!("{truncated}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    use crate::feed::FeedDetails;

    fn snapshot_with_title(title: &str) -> FeedSnapshot {
        FeedSnapshot {
            items: vec![FeedItem {
                id: "slug".to_string(),
                title: title.to_string(),
                slug: "slug".to_string(),
                created_at: Utc::now(),
                thumbs_up_count: 0,
                comments_count: 0,
                body: String::new(),
                details: FeedDetails::Post {
                    author: None,
                    category: None,
                },
            }],
            org_slug: "solsikken".to_string(),
            fetched_at: Utc::now(),
            last_success_at: Some(Utc::now()),
            last_error: None,
        }
    }

    #[test]
    fn test_short_title_passes_through() {
        let state = SensorState::from_snapshot(&snapshot_with_title("Dugnad på lørdag"));
        assert_eq!(state.value, "Dugnad på lørdag");
        assert_eq!(state.organization_slug, "solsikken");
        assert_eq!(state.items.len(), 1);
    }

    #[test]
    fn test_long_title_truncated_by_chars() {
        let long = "æ".repeat(60);
        let state = SensorState::from_snapshot(&snapshot_with_title(&long));
        assert_eq!(state.value.chars().count(), MAX_VALUE_LEN + 1);
        assert!(state.value.ends_with('…'));
    }

    #[test]
    fn test_empty_snapshot_shows_no_data() {
        let state = SensorState::from_snapshot(&FeedSnapshot::empty("solsikken"));
        assert_eq!(state.value, "No Data");
        assert!(state.items.is_empty());
    }
}
