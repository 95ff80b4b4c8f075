//! Article store contract and backends.
//!
//! The pipeline only needs three operations: read the pending backlog and
//! record one of the two terminal outcomes. Each write touches exactly one
//! article, keyed by its id, so replays of the same write are harmless.
//!
//! - [`MemoryStore`]: in-process store, used by tests and by the file backend
//! - [`JsonFileStore`]: a JSON array of articles on disk, rewritten on update

mod file;
mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::error::PersistenceError;
use crate::models::{Article, ArticleId, ProcessedArticle};

pub trait ArticleStore {
    /// Up to `limit` pending articles published within the last
    /// `max_age_hours`, in random order.
    async fn select_pending(&self, limit: usize, max_age_hours: i64) -> Result<Vec<Article>, PersistenceError>;

    /// Record a terminal failure and stamp `processed_at`.
    async fn mark_failed(&self, id: ArticleId, reason: &str) -> Result<(), PersistenceError>;

    /// Record extracted fields, text and title, and stamp `processed_at`.
    async fn mark_processed(&self, id: ArticleId, processed: &ProcessedArticle) -> Result<(), PersistenceError>;
}
