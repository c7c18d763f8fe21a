use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Entry, EntryUpdate, Feed, FeedUpdate, NewEntry, NewUpdatedEntry, ThreadReply};

/// Record store the reconciler reads and writes through.
///
/// `create_entry` must fail with `AppError::NotUnique` when the public id is
/// taken and `AppError::Validation` when a field is rejected.
#[async_trait]
pub trait EntryStore: Send + Sync {
    async fn find_feed(&self, id: i64) -> Result<Option<Feed>>;

    async fn find_entries_by_public_ids(&self, public_ids: &[String]) -> Result<Vec<Entry>>;

    async fn create_entry(&self, entry: NewEntry) -> Result<Entry>;

    async fn update_entry(&self, id: i64, update: EntryUpdate) -> Result<()>;

    async fn update_feed(&self, update: FeedUpdate) -> Result<()>;

    /// The entry of `feed_id` whose upstream id is `entry_id`.
    async fn find_thread_parent(&self, feed_id: i64, entry_id: &str) -> Result<Option<Entry>>;

    /// Appends `reply` to the parent's `data.thread`. Returns `false` when a
    /// reply with the same public id is already there.
    async fn append_thread_reply(&self, parent_id: i64, reply: ThreadReply) -> Result<bool>;

    /// Users with an active, unmuted subscription that shows updates.
    async fn update_subscriber_ids(&self, feed_id: i64) -> Result<Vec<i64>>;

    async fn user_ids_with_unread(&self, entry_id: i64, user_ids: &[i64]) -> Result<Vec<i64>>;

    async fn user_ids_with_updated(&self, entry_id: i64, user_ids: &[i64]) -> Result<Vec<i64>>;

    /// Bulk insert that skips rows already present for (user, entry).
    /// Returns the number of rows written.
    async fn insert_updated_entries(&self, markers: Vec<NewUpdatedEntry>) -> Result<usize>;
}
