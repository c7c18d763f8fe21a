use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

/// Pre-update copy of an entry's fields, captured on its first update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Original {
    pub author: Option<String>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub entry_id: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub data: Value,
}

/// Whether an entry has been changed by an upstream update.
///
/// `Updated` carries the snapshot taken before the first change and never
/// goes back to `Fresh` or swaps its snapshot.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EntryState {
    #[default]
    Fresh,
    Updated(Original),
}

impl EntryState {
    pub fn original(&self) -> Option<&Original> {
        match self {
            EntryState::Fresh => None,
            EntryState::Updated(original) => Some(original),
        }
    }

    /// Move to `Updated` with `original` and return the snapshot just taken.
    /// Returns `None` and keeps the existing snapshot once one exists.
    pub fn snapshot_once(&mut self, original: Original) -> Option<&Original> {
        match self {
            EntryState::Updated(_) => None,
            EntryState::Fresh => {
                *self = EntryState::Updated(original);
                self.original()
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub id: i64,
    pub feed_id: i64,
    pub public_id: String,
    pub entry_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub data: Value,
    pub state: EntryState,
    pub created_at: DateTime<Utc>,
}

impl Entry {
    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Entries older than `window` no longer accept upstream updates.
    pub fn published_recently(&self, window: Duration, now: DateTime<Utc>) -> bool {
        self.published.unwrap_or(self.created_at) > now - window
    }

    /// The snapshot to persist alongside the first update, if this is one.
    ///
    /// Entries without content have nothing worth preserving and stay `Fresh`.
    pub fn pending_original(&self) -> Option<Original> {
        if self.state.original().is_some() || self.content_str().trim().is_empty() {
            return None;
        }
        Some(Original {
            author: self.author.clone(),
            content: self.content.clone(),
            title: self.title.clone(),
            url: self.url.clone(),
            entry_id: self.entry_id.clone(),
            published: self.published,
            data: self.data.clone(),
        })
    }

    pub fn thread_contains(&self, public_id: &str) -> bool {
        self.data
            .get("thread")
            .and_then(Value::as_array)
            .map(|replies| {
                replies
                    .iter()
                    .any(|reply| reply.get("public_id").and_then(Value::as_str) == Some(public_id))
            })
            .unwrap_or(false)
    }
}

/// One item of a batch's `entries` list, as delivered upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IncomingEntry {
    #[serde(default)]
    pub public_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<Value>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub entry_id: Option<String>,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl IncomingEntry {
    /// Only a literal JSON `true` asks for an update.
    pub fn wants_update(&self) -> bool {
        matches!(self.update, Some(Value::Bool(true)))
    }

    pub fn public_id_alt(&self) -> Option<&str> {
        self.data_str("public_id_alt")
    }

    pub fn in_reply_to(&self) -> Option<&str> {
        self.data_str("in_reply_to")
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    fn data_str(&self, key: &str) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.get(key))
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[derive(Debug, Clone)]
pub struct NewEntry {
    pub feed_id: i64,
    pub public_id: String,
    pub entry_id: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub url: Option<String>,
    pub content: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub data: Value,
}

impl NewEntry {
    pub fn from_incoming(feed_id: i64, item: &IncomingEntry, summary: String) -> Self {
        Self {
            feed_id,
            public_id: item.public_id.clone(),
            entry_id: item.entry_id.clone(),
            title: item.title.clone(),
            author: item.author.clone(),
            url: item.url.clone(),
            content: item.content.clone(),
            summary: Some(summary),
            published: item.published,
            data: item.data.clone().unwrap_or_else(|| Value::Object(Default::default())),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.public_id.trim().is_empty() {
            return Err(AppError::Validation("public_id can't be blank".to_string()));
        }
        Ok(())
    }
}

/// Fields written to an existing entry when upstream sends an update.
/// A `None` `data` keeps the stored payload.
#[derive(Debug, Clone)]
pub struct EntryUpdate {
    pub author: Option<String>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub entry_id: Option<String>,
    pub data: Option<Value>,
    pub summary: String,
    pub original: Option<Original>,
}

/// A reply folded into its parent's `data.thread` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadReply {
    pub public_id: String,
    pub entry_id: Option<String>,
    pub author: Option<String>,
    pub content: Option<String>,
    pub url: Option<String>,
    pub published: Option<DateTime<Utc>>,
}

impl From<&IncomingEntry> for ThreadReply {
    fn from(item: &IncomingEntry) -> Self {
        Self {
            public_id: item.public_id.clone(),
            entry_id: item.entry_id.clone(),
            author: item.author.clone(),
            content: item.content.clone(),
            url: item.url.clone(),
            published: item.published,
        }
    }
}
