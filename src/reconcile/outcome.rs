use std::fmt;

/// What happened to one incoming item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    Threaded,
    /// Already stored under its declared alternate id.
    AlternateExists,
    /// Known public id without an update request, or lost a create race.
    Duplicate,
    Updated { notified: usize },
    /// Known entry too old to accept updates.
    Stale,
    /// Rejected by validation.
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub feed_id: i64,
    pub created: usize,
    pub threaded: usize,
    pub alternates: usize,
    pub duplicates: usize,
    pub updated: usize,
    pub stale: usize,
    pub skipped: usize,
    pub failed: usize,
    pub notified: usize,
}

impl BatchReport {
    pub fn new(feed_id: i64) -> Self {
        Self {
            feed_id,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::Threaded => self.threaded += 1,
            ItemOutcome::AlternateExists => self.alternates += 1,
            ItemOutcome::Duplicate => self.duplicates += 1,
            ItemOutcome::Updated { notified } => {
                self.updated += 1;
                self.notified += notified;
            }
            ItemOutcome::Stale => self.stale += 1,
            ItemOutcome::Skipped => self.skipped += 1,
            ItemOutcome::Failed => self.failed += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.created
            + self.threaded
            + self.alternates
            + self.duplicates
            + self.updated
            + self.stale
            + self.skipped
            + self.failed
    }
}

impl fmt::Display for BatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "feed {}: {} created, {} threaded, {} alternate, {} duplicate, {} updated ({} notified), {} stale, {} skipped, {} failed",
            self.feed_id,
            self.created,
            self.threaded,
            self.alternates,
            self.duplicates,
            self.updated,
            self.notified,
            self.stale,
            self.skipped,
            self.failed,
        )
    }
}
