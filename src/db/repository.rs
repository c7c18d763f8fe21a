use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio_rusqlite::Connection;

use crate::error::Result;
use crate::models::{
    Entry, EntryState, EntryUpdate, Feed, FeedUpdate, NewEntry, NewFeed, NewUpdatedEntry,
    Subscription, ThreadReply,
};

use super::schema::SCHEMA;
use super::store::EntryStore;

const ENTRY_COLUMNS: &str = "id, feed_id, public_id, entry_id, title, author, url, content, summary, published, data, original, created_at";
const FEED_COLUMNS: &str = "id, title, url, site_url, description, data, created_at, updated_at";

// Stays well under SQLite's bound parameter limit.
const IN_CLAUSE_CHUNK: usize = 500;

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub async fn new(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path).await?;

        conn.call(|conn| {
            conn.busy_timeout(Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;

        Ok(Self { conn })
    }

    // Feed operations

    pub async fn insert_feed(&self, feed: NewFeed) -> Result<i64> {
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO feeds (title, url, site_url, description) VALUES (?1, ?2, ?3, ?4)",
                    params![feed.title, feed.url, feed.site_url, feed.description],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    // Subscription and marker seeding

    pub async fn insert_subscription(&self, subscription: Subscription) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO subscriptions (user_id, feed_id, active, muted, show_updates) VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        subscription.user_id,
                        subscription.feed_id,
                        subscription.active,
                        subscription.muted,
                        subscription.show_updates,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn insert_unread_entry(&self, user_id: i64, entry_id: i64) -> Result<()> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT OR IGNORE INTO unread_entries (user_id, feed_id, entry_id)
                       SELECT ?1, feed_id, id FROM entries WHERE id = ?2"#,
                    params![user_id, entry_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    // Entry lookups

    pub async fn get_entry_by_public_id(&self, public_id: &str) -> Result<Option<Entry>> {
        let public_id = public_id.to_string();
        let entry = self
            .conn
            .call(move |conn| {
                let entry = conn
                    .query_row(
                        &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE public_id = ?1"),
                        params![public_id],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(entry)
            })
            .await?;
        Ok(entry)
    }

    pub async fn count_entries(&self, feed_id: i64) -> Result<i64> {
        let count = self
            .conn
            .call(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE feed_id = ?1",
                    params![feed_id],
                    |row| row.get(0),
                )?;
                Ok(count)
            })
            .await?;
        Ok(count)
    }

    pub async fn updated_entry_user_ids(&self, entry_id: i64) -> Result<Vec<i64>> {
        let user_ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id FROM updated_entries WHERE entry_id = ?1 ORDER BY user_id",
                )?;
                let user_ids = stmt
                    .query_map(params![entry_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(user_ids)
            })
            .await?;
        Ok(user_ids)
    }

    async fn marker_user_ids(
        &self,
        table: &'static str,
        entry_id: i64,
        user_ids: &[i64],
    ) -> Result<Vec<i64>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let user_ids = user_ids.to_vec();
        let found = self
            .conn
            .call(move |conn| {
                let mut found = Vec::new();
                for chunk in user_ids.chunks(IN_CLAUSE_CHUNK) {
                    let sql = format!(
                        "SELECT user_id FROM {table} WHERE entry_id = ? AND user_id IN ({})",
                        placeholders(chunk.len())
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let values = std::iter::once(entry_id).chain(chunk.iter().copied());
                    let ids = stmt
                        .query_map(params_from_iter(values), |row| row.get::<_, i64>(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    found.extend(ids);
                }
                Ok(found)
            })
            .await?;
        Ok(found)
    }
}

#[async_trait]
impl EntryStore for Repository {
    async fn find_feed(&self, id: i64) -> Result<Option<Feed>> {
        let feed = self
            .conn
            .call(move |conn| {
                let feed = conn
                    .query_row(
                        &format!("SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?1"),
                        params![id],
                        feed_from_row,
                    )
                    .optional()?;
                Ok(feed)
            })
            .await?;
        Ok(feed)
    }

    async fn find_entries_by_public_ids(&self, public_ids: &[String]) -> Result<Vec<Entry>> {
        if public_ids.is_empty() {
            return Ok(Vec::new());
        }
        let public_ids = public_ids.to_vec();
        let entries = self
            .conn
            .call(move |conn| {
                let mut entries = Vec::with_capacity(public_ids.len());
                for chunk in public_ids.chunks(IN_CLAUSE_CHUNK) {
                    let sql = format!(
                        "SELECT {ENTRY_COLUMNS} FROM entries WHERE public_id IN ({})",
                        placeholders(chunk.len())
                    );
                    let mut stmt = conn.prepare(&sql)?;
                    let rows = stmt
                        .query_map(params_from_iter(chunk.iter()), entry_from_row)?
                        .collect::<std::result::Result<Vec<_>, _>>()?;
                    entries.extend(rows);
                }
                Ok(entries)
            })
            .await?;
        Ok(entries)
    }

    async fn create_entry(&self, entry: NewEntry) -> Result<Entry> {
        entry.validate()?;
        let data = serde_json::to_string(&entry.data)?;

        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    r#"INSERT INTO entries (feed_id, public_id, entry_id, title, author, url, content, summary, published, data)
                       VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)"#,
                    params![
                        entry.feed_id,
                        entry.public_id,
                        entry.entry_id,
                        entry.title,
                        entry.author,
                        entry.url,
                        entry.content,
                        entry.summary,
                        entry.published.map(|dt| dt.to_rfc3339()),
                        data,
                    ],
                )?;
                let id = conn.last_insert_rowid();
                let created = conn.query_row(
                    &format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?1"),
                    params![id],
                    entry_from_row,
                )?;
                Ok(created)
            })
            .await?;
        Ok(created)
    }

    async fn update_entry(&self, id: i64, update: EntryUpdate) -> Result<()> {
        let data = update.data.as_ref().map(serde_json::to_string).transpose()?;
        let original = update
            .original
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .call(move |conn| {
                // A stored snapshot always wins over a new one.
                conn.execute(
                    r#"UPDATE entries SET
                           author = ?1,
                           content = ?2,
                           title = ?3,
                           url = ?4,
                           entry_id = ?5,
                           data = COALESCE(?6, data),
                           summary = ?7,
                           original = COALESCE(original, ?8),
                           updated_at = datetime('now')
                       WHERE id = ?9"#,
                    params![
                        update.author,
                        update.content,
                        update.title,
                        update.url,
                        update.entry_id,
                        data,
                        update.summary,
                        original,
                        id,
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn update_feed(&self, update: FeedUpdate) -> Result<()> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let raw: Option<String> = tx
                    .query_row(
                        "SELECT data FROM feeds WHERE id = ?1",
                        params![update.id],
                        |row| row.get(0),
                    )
                    .optional()?;
                let Some(raw) = raw else {
                    return Ok(());
                };

                let mut data: Map<String, Value> = serde_json::from_str(&raw)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                data.extend(update.extra);
                let data = serde_json::to_string(&data)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

                tx.execute(
                    r#"UPDATE feeds SET
                           title = COALESCE(?1, title),
                           url = COALESCE(?2, url),
                           site_url = COALESCE(?3, site_url),
                           description = COALESCE(?4, description),
                           data = ?5,
                           updated_at = datetime('now')
                       WHERE id = ?6"#,
                    params![
                        update.title,
                        update.url,
                        update.site_url,
                        update.description,
                        data,
                        update.id,
                    ],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn find_thread_parent(&self, feed_id: i64, entry_id: &str) -> Result<Option<Entry>> {
        let entry_id = entry_id.to_string();
        let parent = self
            .conn
            .call(move |conn| {
                let parent = conn
                    .query_row(
                        &format!(
                            "SELECT {ENTRY_COLUMNS} FROM entries WHERE feed_id = ?1 AND entry_id = ?2 ORDER BY id LIMIT 1"
                        ),
                        params![feed_id, entry_id],
                        entry_from_row,
                    )
                    .optional()?;
                Ok(parent)
            })
            .await?;
        Ok(parent)
    }

    async fn append_thread_reply(&self, parent_id: i64, reply: ThreadReply) -> Result<bool> {
        let reply = serde_json::to_value(&reply)?;

        let appended = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let raw: String = tx.query_row(
                    "SELECT data FROM entries WHERE id = ?1",
                    params![parent_id],
                    |row| row.get(0),
                )?;
                let mut data: Map<String, Value> = serde_json::from_str(&raw)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;

                let thread = data
                    .entry("thread")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if !thread.is_array() {
                    *thread = Value::Array(Vec::new());
                }
                let Some(replies) = thread.as_array_mut() else {
                    return Ok(false);
                };
                if replies
                    .iter()
                    .any(|existing| existing.get("public_id") == reply.get("public_id"))
                {
                    return Ok(false);
                }
                replies.push(reply);

                let data = serde_json::to_string(&data)
                    .map_err(|e| tokio_rusqlite::Error::Other(Box::new(e)))?;
                tx.execute(
                    "UPDATE entries SET data = ?1, updated_at = datetime('now') WHERE id = ?2",
                    params![data, parent_id],
                )?;
                tx.commit()?;
                Ok(true)
            })
            .await?;
        Ok(appended)
    }

    async fn update_subscriber_ids(&self, feed_id: i64) -> Result<Vec<i64>> {
        let user_ids = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    r#"SELECT user_id FROM subscriptions
                       WHERE feed_id = ?1 AND active = 1 AND muted = 0 AND show_updates = 1
                       ORDER BY user_id"#,
                )?;
                let user_ids = stmt
                    .query_map(params![feed_id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<i64>, _>>()?;
                Ok(user_ids)
            })
            .await?;
        Ok(user_ids)
    }

    async fn user_ids_with_unread(&self, entry_id: i64, user_ids: &[i64]) -> Result<Vec<i64>> {
        self.marker_user_ids("unread_entries", entry_id, user_ids).await
    }

    async fn user_ids_with_updated(&self, entry_id: i64, user_ids: &[i64]) -> Result<Vec<i64>> {
        self.marker_user_ids("updated_entries", entry_id, user_ids).await
    }

    async fn insert_updated_entries(&self, markers: Vec<NewUpdatedEntry>) -> Result<usize> {
        if markers.is_empty() {
            return Ok(0);
        }
        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO updated_entries (user_id, feed_id, entry_id, published) VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for marker in &markers {
                        inserted += stmt.execute(params![
                            marker.user_id,
                            marker.feed_id,
                            marker.entry_id,
                            marker.published.map(|dt| dt.to_rfc3339()),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;
        Ok(inserted)
    }
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    // RFC3339 for values we write, SQLite's datetime('now') for column defaults
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    None
}

fn json_column<T: DeserializeOwned>(idx: usize, raw: &str) -> rusqlite::Result<T> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn feed_from_row(row: &Row) -> rusqlite::Result<Feed> {
    let data: String = row.get(5)?;
    Ok(Feed {
        id: row.get(0)?,
        title: row.get(1)?,
        url: row.get(2)?,
        site_url: row.get(3)?,
        description: row.get(4)?,
        data: json_column(5, &data)?,
        created_at: row
            .get::<_, String>(6)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
        updated_at: row
            .get::<_, String>(7)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

fn entry_from_row(row: &Row) -> rusqlite::Result<Entry> {
    let data: String = row.get(10)?;
    let state = match row.get::<_, Option<String>>(11)? {
        Some(raw) => EntryState::Updated(json_column(11, &raw)?),
        None => EntryState::Fresh,
    };

    Ok(Entry {
        id: row.get(0)?,
        feed_id: row.get(1)?,
        public_id: row.get(2)?,
        entry_id: row.get(3)?,
        title: row.get(4)?,
        author: row.get(5)?,
        url: row.get(6)?,
        content: row.get(7)?,
        summary: row.get(8)?,
        published: row
            .get::<_, Option<String>>(9)?
            .and_then(|s| parse_datetime(&s)),
        data: json_column(10, &data)?,
        state,
        created_at: row
            .get::<_, String>(12)
            .ok()
            .and_then(|s| parse_datetime(&s))
            .unwrap_or_else(Utc::now),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{IncomingEntry, Original};
    use serde_json::json;
    use tempfile::TempDir;

    async fn repository() -> (TempDir, Repository, i64) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.db");
        let repo = Repository::new(path.to_str().unwrap()).await.unwrap();
        let feed_id = repo
            .insert_feed(NewFeed {
                title: "Example".to_string(),
                url: "https://example.com/feed.xml".to_string(),
                site_url: None,
                description: None,
            })
            .await
            .unwrap();
        (dir, repo, feed_id)
    }

    fn new_entry(feed_id: i64, public_id: &str) -> NewEntry {
        let item = IncomingEntry {
            public_id: public_id.to_string(),
            content: Some("<p>hello</p>".to_string()),
            entry_id: Some(format!("upstream-{public_id}")),
            ..Default::default()
        };
        NewEntry::from_incoming(feed_id, &item, "hello".to_string())
    }

    #[tokio::test]
    async fn duplicate_public_id_is_not_unique() {
        let (_dir, repo, feed_id) = repository().await;
        repo.create_entry(new_entry(feed_id, "a")).await.unwrap();

        let err = repo.create_entry(new_entry(feed_id, "a")).await.unwrap_err();
        assert!(err.is_not_unique(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn blank_public_id_is_validation_failure() {
        let (_dir, repo, feed_id) = repository().await;
        let err = repo.create_entry(new_entry(feed_id, " ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn finds_entries_by_public_id() {
        let (_dir, repo, feed_id) = repository().await;
        repo.create_entry(new_entry(feed_id, "a")).await.unwrap();
        repo.create_entry(new_entry(feed_id, "b")).await.unwrap();

        let found = repo
            .find_entries_by_public_ids(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].public_id, "a");
        assert_eq!(found[0].state, EntryState::Fresh);
    }

    #[tokio::test]
    async fn stored_original_is_never_replaced() {
        let (_dir, repo, feed_id) = repository().await;
        let entry = repo.create_entry(new_entry(feed_id, "a")).await.unwrap();
        let snapshot = entry.pending_original().unwrap();

        let update = |content: &str, original: Option<Original>| EntryUpdate {
            author: None,
            content: Some(content.to_string()),
            title: None,
            url: None,
            entry_id: None,
            data: None,
            summary: content.to_string(),
            original,
        };
        repo.update_entry(entry.id, update("second", Some(snapshot.clone())))
            .await
            .unwrap();

        let mut other = snapshot.clone();
        other.content = Some("second".to_string());
        repo.update_entry(entry.id, update("third", Some(other)))
            .await
            .unwrap();

        let stored = repo.get_entry_by_public_id("a").await.unwrap().unwrap();
        assert_eq!(stored.content.as_deref(), Some("third"));
        assert_eq!(stored.state.original(), Some(&snapshot));
    }

    #[tokio::test]
    async fn feed_update_merges_extra_fields() {
        let (_dir, repo, feed_id) = repository().await;
        let mut update = FeedUpdate {
            id: feed_id,
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        update.extra.insert("etag".to_string(), json!("abc"));
        repo.update_feed(update).await.unwrap();

        let feed = repo.find_feed(feed_id).await.unwrap().unwrap();
        assert_eq!(feed.title, "Renamed");
        assert_eq!(feed.url, "https://example.com/feed.xml");
        assert_eq!(feed.data.get("etag"), Some(&json!("abc")));
    }

    async fn corrupt_data(repo: &Repository, table: &'static str, id: i64) {
        repo.conn
            .call(move |conn| {
                conn.execute(
                    &format!("UPDATE {table} SET data = '{{not json' WHERE id = ?1"),
                    params![id],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    async fn raw_data(repo: &Repository, table: &'static str, id: i64) -> String {
        repo.conn
            .call(move |conn| {
                Ok(conn.query_row(
                    &format!("SELECT data FROM {table} WHERE id = ?1"),
                    params![id],
                    |row| row.get::<_, String>(0),
                )?)
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unreadable_feed_data_is_not_overwritten() {
        let (_dir, repo, feed_id) = repository().await;
        corrupt_data(&repo, "feeds", feed_id).await;

        let mut update = FeedUpdate {
            id: feed_id,
            title: Some("Renamed".to_string()),
            ..Default::default()
        };
        update.extra.insert("etag".to_string(), json!("abc"));

        assert!(repo.update_feed(update).await.is_err());
        assert_eq!(raw_data(&repo, "feeds", feed_id).await, "{not json");
    }

    #[tokio::test]
    async fn unreadable_entry_data_rejects_thread_reply() {
        let (_dir, repo, feed_id) = repository().await;
        let parent = repo.create_entry(new_entry(feed_id, "root")).await.unwrap();
        corrupt_data(&repo, "entries", parent.id).await;

        let reply = ThreadReply {
            public_id: "reply".to_string(),
            entry_id: None,
            author: None,
            content: Some("more".to_string()),
            url: None,
            published: None,
        };

        assert!(repo.append_thread_reply(parent.id, reply).await.is_err());
        assert_eq!(raw_data(&repo, "entries", parent.id).await, "{not json");
    }

    #[tokio::test]
    async fn updated_entries_ignore_duplicates() {
        let (_dir, repo, feed_id) = repository().await;
        let entry = repo.create_entry(new_entry(feed_id, "a")).await.unwrap();
        let marker = NewUpdatedEntry {
            user_id: 7,
            entry_id: entry.id,
            feed_id,
            published: None,
        };

        let first = repo.insert_updated_entries(vec![marker.clone()]).await.unwrap();
        let second = repo
            .insert_updated_entries(vec![marker.clone(), marker])
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 0);
        assert_eq!(repo.updated_entry_user_ids(entry.id).await.unwrap(), vec![7]);
    }

    #[tokio::test]
    async fn thread_reply_is_appended_once() {
        let (_dir, repo, feed_id) = repository().await;
        let parent = repo.create_entry(new_entry(feed_id, "root")).await.unwrap();
        let reply = ThreadReply {
            public_id: "reply".to_string(),
            entry_id: None,
            author: None,
            content: Some("more".to_string()),
            url: None,
            published: None,
        };

        assert!(repo.append_thread_reply(parent.id, reply.clone()).await.unwrap());
        assert!(!repo.append_thread_reply(parent.id, reply).await.unwrap());

        let stored = repo.get_entry_by_public_id("root").await.unwrap().unwrap();
        assert!(stored.thread_contains("reply"));
        assert_eq!(stored.data["thread"].as_array().map(Vec::len), Some(1));
    }

    #[tokio::test]
    async fn subscriber_filter_respects_flags() {
        let (_dir, repo, feed_id) = repository().await;
        repo.insert_subscription(Subscription::new(1, feed_id)).await.unwrap();
        repo.insert_subscription(Subscription { muted: true, ..Subscription::new(2, feed_id) })
            .await
            .unwrap();
        repo.insert_subscription(Subscription { active: false, ..Subscription::new(3, feed_id) })
            .await
            .unwrap();
        repo.insert_subscription(Subscription {
            show_updates: false,
            ..Subscription::new(4, feed_id)
        })
        .await
        .unwrap();

        assert_eq!(repo.update_subscriber_ids(feed_id).await.unwrap(), vec![1]);
    }
}
