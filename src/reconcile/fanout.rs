use std::collections::HashSet;

use serde_json::json;

use crate::db::EntryStore;
use crate::error::Result;
use crate::models::{Entry, NewUpdatedEntry};
use crate::services::{counters, ErrorReporter, Metrics};

/// Writes update notices for subscribers who haven't seen the change yet.
pub struct Fanout<'a> {
    store: &'a dyn EntryStore,
    reporter: &'a dyn ErrorReporter,
    metrics: &'a dyn Metrics,
}

impl<'a> Fanout<'a> {
    pub fn new(
        store: &'a dyn EntryStore,
        reporter: &'a dyn ErrorReporter,
        metrics: &'a dyn Metrics,
    ) -> Self {
        Self {
            store,
            reporter,
            metrics,
        }
    }

    /// Returns how many notices were written. Failures are reported, never
    /// returned: the entry update they follow has already been applied.
    pub async fn notify(&self, entry: &Entry) -> usize {
        match self.create_update_notifications(entry).await {
            Ok(inserted) => {
                self.metrics.increment(counters::UPDATE_BIG);
                inserted
            }
            Err(e) => {
                self.reporter.report(
                    "receiver#create_update_notifications",
                    "create_update_notifications failed",
                    json!({
                        "entry_id": entry.id,
                        "feed_id": entry.feed_id,
                        "error": e.to_string(),
                    }),
                );
                0
            }
        }
    }

    async fn create_update_notifications(&self, entry: &Entry) -> Result<usize> {
        let subscriber_ids = self.store.update_subscriber_ids(entry.feed_id).await?;
        if subscriber_ids.is_empty() {
            return Ok(0);
        }

        // Unread readers get the new content anyway; notified ones already know.
        let unread: HashSet<i64> = self
            .store
            .user_ids_with_unread(entry.id, &subscriber_ids)
            .await?
            .into_iter()
            .collect();
        let updated: HashSet<i64> = self
            .store
            .user_ids_with_updated(entry.id, &subscriber_ids)
            .await?
            .into_iter()
            .collect();

        let markers: Vec<NewUpdatedEntry> = subscriber_ids
            .into_iter()
            .filter(|user_id| !unread.contains(user_id) && !updated.contains(user_id))
            .map(|user_id| NewUpdatedEntry {
                user_id,
                entry_id: entry.id,
                feed_id: entry.feed_id,
                published: entry.published,
            })
            .collect();

        let inserted = self.store.insert_updated_entries(markers).await?;
        tracing::debug!(entry = %entry.public_id, inserted, "Created update notifications");
        Ok(inserted)
    }
}
