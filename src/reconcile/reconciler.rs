use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::json;

use crate::config::Config;
use crate::db::EntryStore;
use crate::error::{AppError, Result};
use crate::models::{Batch, Entry, EntryUpdate, Feed, IncomingEntry, NewEntry};
use crate::services::{
    counters, summary, CounterMetrics, DuplicateCache, ErrorReporter, HtmlSanitizer, Metrics,
    Sanitizer, TracingReporter,
};

use super::fanout::Fanout;
use super::outcome::{BatchReport, ItemOutcome};
use super::significance::SignificanceDetector;
use super::threading::Threader;

#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub summary_length: usize,
    pub significance_threshold: usize,
    pub update_window: Duration,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            summary_length: 256,
            significance_threshold: 50,
            update_window: Duration::days(7),
        }
    }
}

impl From<&Config> for ReconcileSettings {
    fn from(config: &Config) -> Self {
        Self {
            summary_length: config.summary_length,
            significance_threshold: config.significance_threshold,
            update_window: Duration::days(i64::from(config.update_window_days)),
        }
    }
}

/// Applies a refresh batch to the entry store.
///
/// Items are handled one at a time and independently: a failing item is
/// reported and the rest of the batch carries on. The feed's own fields are
/// written once, after every item has been handled.
pub struct Reconciler {
    store: Arc<dyn EntryStore>,
    cache: Arc<dyn DuplicateCache>,
    sanitizer: Arc<dyn Sanitizer>,
    reporter: Arc<dyn ErrorReporter>,
    metrics: Arc<dyn Metrics>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntryStore>, cache: Arc<dyn DuplicateCache>) -> Self {
        Self {
            store,
            cache,
            sanitizer: Arc::new(HtmlSanitizer),
            reporter: Arc::new(TracingReporter),
            metrics: Arc::new(CounterMetrics),
            settings: ReconcileSettings::default(),
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Arc<dyn Sanitizer>) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_settings(mut self, settings: ReconcileSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Fails only when the batch's feed is unknown or its final field
    /// update can't be written. Item failures end up in the report.
    pub async fn receive(&self, batch: Batch) -> Result<BatchReport> {
        let feed_id = batch.feed.id;
        let feed = self
            .store
            .find_feed(feed_id)
            .await?
            .ok_or(AppError::FeedNotFound(feed_id))?;

        let mut report = BatchReport::new(feed.id);
        let items = batch.entries();
        if !items.is_empty() {
            self.receive_entries(items, &feed, &mut report).await;
        }

        self.store.update_feed(batch.feed).await?;

        tracing::info!("{}", report);
        Ok(report)
    }

    async fn receive_entries(
        &self,
        items: &[IncomingEntry],
        feed: &Feed,
        report: &mut BatchReport,
    ) {
        let public_ids: Vec<String> = items.iter().map(|item| item.public_id.clone()).collect();
        let lookup = self.store.find_entries_by_public_ids(&public_ids).await;
        let entries: HashMap<String, Entry> = match lookup {
            Ok(entries) => entries
                .into_iter()
                .map(|entry| (entry.public_id.clone(), entry))
                .collect(),
            Err(e) => {
                self.reporter.report(
                    "receiver#receive_entries",
                    "Entry lookup failed",
                    json!({ "feed_id": feed.id, "count": items.len(), "error": error_chain(&e) }),
                );
                for _ in items {
                    report.record(ItemOutcome::Failed);
                }
                return;
            }
        };

        for item in items {
            let outcome = self.receive_entry(item, entries.get(&item.public_id), feed).await;
            self.cache_public_id(item).await;
            report.record(outcome);
        }
    }

    async fn receive_entry(
        &self,
        item: &IncomingEntry,
        entry: Option<&Entry>,
        feed: &Feed,
    ) -> ItemOutcome {
        let update = item.wants_update();
        let result = match entry {
            Some(entry) if update => self.update_entry(item, entry).await,
            Some(_) => Ok(ItemOutcome::Duplicate),
            None => self.create_entry(item, feed).await,
        };

        match result {
            Ok(ItemOutcome::Duplicate) => {
                self.metrics.increment(counters::DUPLICATE);
                ItemOutcome::Duplicate
            }
            Ok(outcome) => outcome,
            // Another refresh inserted the same public id first.
            Err(e) if e.is_not_unique() => {
                tracing::debug!(public_id = %item.public_id, "Entry already exists");
                self.metrics.increment(counters::DUPLICATE);
                ItemOutcome::Duplicate
            }
            Err(e) if e.is_validation() => {
                tracing::debug!(public_id = %item.public_id, error = %e, "Skipping invalid entry");
                ItemOutcome::Skipped
            }
            Err(e) => {
                let action = if update { "update" } else { "create" };
                self.reporter.report(
                    &format!("receiver#{action}"),
                    &format!("Entry {action} failed"),
                    json!({
                        "feed_id": feed.id,
                        "item": item,
                        "error": error_chain(&e),
                    }),
                );
                ItemOutcome::Failed
            }
        }
    }

    async fn create_entry(&self, item: &IncomingEntry, feed: &Feed) -> Result<ItemOutcome> {
        if self.alternate_exists(item).await? {
            self.metrics.increment(counters::ALTERNATE_EXISTS);
            return Ok(ItemOutcome::AlternateExists);
        }

        if Threader::new(self.store.as_ref()).thread(item, feed).await? {
            self.metrics.increment(counters::THREAD);
            return Ok(ItemOutcome::Threaded);
        }

        let text = self.sanitizer.strip(item.content_str())?;
        let excerpt = summary(&text, self.settings.summary_length);
        let entry = NewEntry::from_incoming(feed.id, item, excerpt);
        self.store.create_entry(entry).await?;
        self.metrics.increment(counters::CREATE);
        Ok(ItemOutcome::Created)
    }

    async fn update_entry(&self, item: &IncomingEntry, entry: &Entry) -> Result<ItemOutcome> {
        if !entry.published_recently(self.settings.update_window, Utc::now()) {
            return Ok(ItemOutcome::Stale);
        }

        let current_content = entry.content_str();
        let new_content = item.content_str();
        let text = self.sanitizer.strip(new_content)?;

        let mut state = entry.state.clone();
        let original = match entry.pending_original() {
            Some(snapshot) => state.snapshot_once(snapshot).cloned(),
            None => None,
        };

        let update = EntryUpdate {
            author: item.author.clone(),
            content: item.content.clone(),
            title: item.title.clone(),
            url: item.url.clone(),
            entry_id: item.entry_id.clone(),
            data: item.data.clone(),
            summary: summary(&text, self.settings.summary_length),
            original,
        };
        self.store.update_entry(entry.id, update).await?;

        let detector = SignificanceDetector::new(
            self.sanitizer.as_ref(),
            self.reporter.as_ref(),
            self.settings.significance_threshold,
        );
        let notified = if detector.is_significant(current_content, new_content) {
            Fanout::new(self.store.as_ref(), self.reporter.as_ref(), self.metrics.as_ref())
                .notify(entry)
                .await
        } else {
            0
        };

        if new_content.chars().count() == current_content.chars().count() {
            self.metrics.increment(counters::NO_CHANGE);
        }
        self.metrics.increment(counters::UPDATE);

        Ok(ItemOutcome::Updated { notified })
    }

    async fn alternate_exists(&self, item: &IncomingEntry) -> Result<bool> {
        match item.public_id_alt() {
            Some(alt) => self.cache.exists(alt).await,
            None => Ok(false),
        }
    }

    async fn cache_public_id(&self, item: &IncomingEntry) {
        if item.public_id.is_empty() {
            return;
        }
        if let Err(e) = self
            .cache
            .register(&item.public_id, item.content_str(), item.public_id_alt())
            .await
        {
            self.reporter.report(
                "receiver#cache_public_id",
                "Public id cache update failed",
                json!({ "public_id": item.public_id, "error": error_chain(&e) }),
            );
        }
    }
}

fn error_chain(err: &AppError) -> Vec<String> {
    let mut chain = vec![err.to_string()];
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = std::error::Error::source(cause);
    }
    chain
}
