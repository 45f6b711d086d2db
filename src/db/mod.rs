//! Storage seam for the recommendation core
//!
//! The core only ever talks to [`Store`]; the PostgreSQL backend serves
//! production traffic and the in-memory backend serves local runs and tests.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::{
    error::AppResult,
    models::{FeedbackSignal, FeedbackUpsert, SearchRecord, SignalRow, SignalSource, WorkRow},
};

pub mod memory;
pub mod postgres;

pub use memory::{MemoryStore, RankingEntry, WorkRecord};
pub use postgres::{create_pool, PgStore};

/// Read/write operations the recommendation core needs from storage
///
/// Candidate reads only ever return works whose status is serializing or
/// completed. An empty `category_ids` slice means "any category".
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    /// Rows of one non-feedback signal source for a user, one per work
    /// (collections: one per bookshelf entry)
    async fn signal_rows(&self, user_id: i64, source: SignalSource) -> AppResult<Vec<SignalRow>>;

    /// All feedback rows of a user joined to their works
    async fn feedback_signals(&self, user_id: i64) -> AppResult<Vec<FeedbackSignal>>;

    /// Merges one feedback event and purges the user's rows older than
    /// `purge_before`, as a single atomic unit
    async fn upsert_feedback(
        &self,
        upsert: FeedbackUpsert,
        purge_before: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Listed works ordered by votes, collects, reads, then recency
    async fn candidate_works(&self, category_ids: &[i64], limit: usize) -> AppResult<Vec<WorkRow>>;

    /// Listed works whose title, intro, author or tags contain `keyword`
    async fn keyword_matches(&self, keyword: &str, limit: usize) -> AppResult<Vec<WorkRow>>;

    /// Rows of the latest ranking snapshots for a category (`None` for the
    /// general, category-less boards), in rank order
    async fn ranking_rows(&self, category_id: Option<i64>, limit: usize) -> AppResult<Vec<WorkRow>>;

    /// Category ids ordered by `votes * 3 + collects * 2 + reads` over listed works
    async fn popular_categories(&self, limit: usize) -> AppResult<Vec<i64>>;

    /// Display names for the given categories; unknown ids are absent
    async fn category_names(&self, category_ids: &[i64]) -> AppResult<HashMap<i64, String>>;

    /// A user's search records, newest first
    async fn recent_searches(&self, user_id: i64, limit: usize) -> AppResult<Vec<SearchRecord>>;

    /// Replaces any identical keyword in the user's history with `record`
    /// and keeps only the newest `keep` entries
    async fn record_search(&self, user_id: i64, record: SearchRecord, keep: usize) -> AppResult<()>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
