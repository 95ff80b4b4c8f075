use chrono::{Duration, Utc};
use rand::rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::ArticleStore;
use crate::error::PersistenceError;
use crate::models::{Article, ArticleId, ProcessedArticle};

/// In-memory article store.
///
/// The first terminal outcome recorded for an article wins; later writes for
/// the same id are accepted and ignored, so a replayed step cannot overwrite
/// fields stored by an earlier one.
#[derive(Debug, Default)]
pub struct MemoryStore {
    articles: RwLock<BTreeMap<ArticleId, Article>>,
}

impl MemoryStore {
    pub fn new(articles: impl IntoIterator<Item = Article>) -> Self {
        Self {
            articles: RwLock::new(articles.into_iter().map(|a| (a.id, a)).collect()),
        }
    }

    pub async fn insert(&self, article: Article) {
        self.articles.write().await.insert(article.id, article);
    }

    pub async fn get(&self, id: ArticleId) -> Option<Article> {
        self.articles.read().await.get(&id).cloned()
    }

    /// Every article, ordered by id.
    pub async fn snapshot(&self) -> Vec<Article> {
        self.articles.read().await.values().cloned().collect()
    }

    /// Apply `update` to a pending article. Returns whether anything changed.
    pub(crate) async fn update_pending(
        &self,
        id: ArticleId,
        update: impl FnOnce(&mut Article),
    ) -> Result<bool, PersistenceError> {
        let mut articles = self.articles.write().await;
        let article = articles.get_mut(&id).ok_or(PersistenceError::NotFound(id))?;
        if !article.is_pending() {
            debug!(article_id = id, "Article already terminal; write ignored");
            return Ok(false);
        }
        update(article);
        Ok(true)
    }
}

impl ArticleStore for MemoryStore {
    async fn select_pending(&self, limit: usize, max_age_hours: i64) -> Result<Vec<Article>, PersistenceError> {
        let cutoff = Utc::now() - Duration::hours(max_age_hours);
        let mut pending: Vec<Article> = self
            .articles
            .read()
            .await
            .values()
            .filter(|a| a.is_pending() && a.published_at >= cutoff)
            .cloned()
            .collect();
        pending.shuffle(&mut rng());
        pending.truncate(limit);
        Ok(pending)
    }

    async fn mark_failed(&self, id: ArticleId, reason: &str) -> Result<(), PersistenceError> {
        self.update_pending(id, |a| {
            a.fail_reason = Some(reason.to_string());
            a.processed_at = Some(Utc::now());
        })
        .await
        .map(drop)
    }

    async fn mark_processed(&self, id: ArticleId, processed: &ProcessedArticle) -> Result<(), PersistenceError> {
        self.update_pending(id, |a| {
            a.content = Some(processed.text.clone());
            a.title = processed.title.clone();
            a.completeness = Some(processed.completeness);
            a.relevance = Some(processed.relevance);
            a.language = Some(processed.language.clone());
            a.location = processed.location.clone();
            a.summary = processed.summary.clone();
            a.processed_at = Some(Utc::now());
        })
        .await
        .map(drop)
    }
}
