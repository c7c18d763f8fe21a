use serde::{Deserialize, Serialize};

use super::{FeedUpdate, IncomingEntry};

/// One refresh result for a single feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub feed: FeedUpdate,
    #[serde(default)]
    pub entries: Option<Vec<IncomingEntry>>,
}

impl Batch {
    pub fn entries(&self) -> &[IncomingEntry] {
        self.entries.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_metadata_only_batch() {
        let batch: Batch =
            serde_json::from_str(r#"{"feed":{"id":3,"title":"Renamed","etag":"abc"}}"#).unwrap();
        assert_eq!(batch.feed.id, 3);
        assert_eq!(batch.feed.title.as_deref(), Some("Renamed"));
        assert_eq!(batch.feed.extra.get("etag").and_then(|v| v.as_str()), Some("abc"));
        assert!(batch.entries().is_empty());
    }

    #[test]
    fn parses_entries() {
        let batch: Batch = serde_json::from_str(
            r#"{"feed":{"id":1},"entries":[{"public_id":"a","update":false,"content":"X","published":"2026-10-01T12:00:00Z"}]}"#,
        )
        .unwrap();
        let entries = batch.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].public_id, "a");
        assert!(entries[0].published.is_some());
    }
}
