use crate::db::EntryStore;
use crate::error::Result;
use crate::models::{Entry, Feed, IncomingEntry, ThreadReply};

/// Folds self-replies into the entry they continue.
///
/// An item is threaded when `data.in_reply_to` names the upstream
/// `entry_id` of an entry already stored for the same feed and both were
/// written by the same author. The reply is appended to the parent's
/// `data.thread` list instead of becoming an entry of its own.
pub struct Threader<'a> {
    store: &'a dyn EntryStore,
}

impl<'a> Threader<'a> {
    pub fn new(store: &'a dyn EntryStore) -> Self {
        Self { store }
    }

    pub async fn thread(&self, item: &IncomingEntry, feed: &Feed) -> Result<bool> {
        let Some(parent_ref) = item.in_reply_to() else {
            return Ok(false);
        };
        let Some(parent) = self.store.find_thread_parent(feed.id, parent_ref).await? else {
            return Ok(false);
        };
        if !same_author(&parent, item) {
            return Ok(false);
        }

        if parent.thread_contains(&item.public_id) {
            return Ok(true);
        }

        let appended = self
            .store
            .append_thread_reply(parent.id, ThreadReply::from(item))
            .await?;
        tracing::debug!(
            parent = %parent.public_id,
            reply = %item.public_id,
            appended,
            "Threaded reply"
        );
        Ok(true)
    }
}

fn same_author(parent: &Entry, item: &IncomingEntry) -> bool {
    match (parent.author.as_deref(), item.author.as_deref()) {
        (Some(parent), Some(reply)) => {
            let parent = parent.trim();
            !parent.is_empty() && parent.eq_ignore_ascii_case(reply.trim())
        }
        _ => false,
    }
}
