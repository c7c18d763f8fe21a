use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::io::AsyncReadExt;

use crate::config::Config;
use crate::db::Repository;
use crate::error::Result;
use crate::models::Batch;
use crate::reconcile::{BatchReport, ReconcileSettings, Reconciler};
use crate::services::MemoryDuplicateCache;

pub struct App {
    pub repository: Arc<Repository>,
    reconciler: Reconciler,
    workers: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = Arc::new(Repository::new(&config.db_path).await?);
        let cache = Arc::new(MemoryDuplicateCache::new(
            config.cache_capacity,
            Duration::from_secs(config.cache_ttl_seconds),
        ));

        let reconciler = Reconciler::new(repository.clone(), cache)
            .with_settings(ReconcileSettings::from(config));

        Ok(Self {
            repository,
            reconciler,
            workers: config.workers.max(1),
        })
    }

    pub async fn receive(&self, batch: Batch) -> Result<BatchReport> {
        self.reconciler.receive(batch).await
    }

    /// Reconcile every batch file concurrently. `-` reads one batch from stdin.
    pub async fn receive_files(&self, paths: Vec<PathBuf>) -> Vec<BatchReport> {
        stream::iter(paths)
            .map(|path| async move {
                let result = match read_batch(&path).await {
                    Ok(batch) => self.receive(batch).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(report) => Some(report),
                    Err(e) => {
                        tracing::warn!("Failed to receive {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .buffer_unordered(self.workers)
            .filter_map(|r| async { r })
            .collect()
            .await
    }
}

async fn read_batch(path: &Path) -> Result<Batch> {
    let content = if path == Path::new("-") {
        let mut content = String::new();
        tokio::io::stdin().read_to_string(&mut content).await?;
        content
    } else {
        tokio::fs::read_to_string(path).await?
    };
    Ok(serde_json::from_str(&content)?)
}
