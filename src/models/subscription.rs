use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub user_id: i64,
    pub feed_id: i64,
    pub active: bool,
    pub muted: bool,
    pub show_updates: bool,
}

impl Subscription {
    /// An active, unmuted subscription that opted into update notices.
    pub fn new(user_id: i64, feed_id: i64) -> Self {
        Self {
            user_id,
            feed_id,
            active: true,
            muted: false,
            show_updates: true,
        }
    }
}

/// Marker telling a user that an entry they already read has changed.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUpdatedEntry {
    pub user_id: i64,
    pub entry_id: i64,
    pub feed_id: i64,
    pub published: Option<DateTime<Utc>>,
}
