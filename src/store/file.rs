use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::{ArticleStore, MemoryStore};
use crate::error::PersistenceError;
use crate::models::{Article, ArticleId, ProcessedArticle};

/// Article store backed by a JSON array on disk.
///
/// Reads are served from memory. Every effective write rewrites the whole
/// file through a temporary sibling and a rename, so the file on disk is
/// always a complete snapshot.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    inner: MemoryStore,
    flush: Mutex<()>,
}

impl JsonFileStore {
    #[instrument(level = "info", skip_all, fields(path = %path.as_ref().display()))]
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        let raw = fs::read_to_string(&path).await?;
        let articles: Vec<Article> = serde_json::from_str(&raw)?;
        let pending = articles.iter().filter(|a| a.is_pending()).count();
        info!(total = articles.len(), pending, "Loaded article store");
        Ok(Self {
            path,
            inner: MemoryStore::new(articles),
            flush: Mutex::new(()),
        })
    }

    pub async fn snapshot(&self) -> Vec<Article> {
        self.inner.snapshot().await
    }

    async fn persist(&self) -> Result<(), PersistenceError> {
        let _guard = self.flush.lock().await;
        let json = serde_json::to_string_pretty(&self.inner.snapshot().await)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

impl ArticleStore for JsonFileStore {
    async fn select_pending(&self, limit: usize, max_age_hours: i64) -> Result<Vec<Article>, PersistenceError> {
        self.inner.select_pending(limit, max_age_hours).await
    }

    async fn mark_failed(&self, id: ArticleId, reason: &str) -> Result<(), PersistenceError> {
        self.inner.mark_failed(id, reason).await?;
        self.persist().await
    }

    async fn mark_processed(&self, id: ArticleId, processed: &ProcessedArticle) -> Result<(), PersistenceError> {
        self.inner.mark_processed(id, processed).await?;
        self.persist().await
    }
}
