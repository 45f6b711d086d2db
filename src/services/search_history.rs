use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{SearchRecord, SearchType},
};

/// Searches kept per reader
pub const HISTORY_KEEP: usize = 100;

/// Longest keyword stored, in characters
pub const MAX_KEYWORD_CHARS: usize = 100;

const DEFAULT_HISTORY_LIMIT: i64 = 20;

/// Newest-first keywords, trimmed and de-duplicated case-insensitively
///
/// The first casing seen wins.
pub fn distinct_keywords(records: &[SearchRecord]) -> Vec<String> {
    let mut seen = HashSet::new();
    records
        .iter()
        .map(|record| record.keyword.trim())
        .filter(|keyword| !keyword.is_empty())
        .filter(|keyword| seen.insert(keyword.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Reader search history
#[derive(Clone)]
pub struct SearchHistoryService {
    store: Arc<dyn Store>,
}

impl SearchHistoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Stores a search, replacing an identical earlier keyword
    pub async fn record(
        &self,
        user_id: i64,
        keyword: &str,
        by_author: bool,
        now: DateTime<Utc>,
    ) -> AppResult<SearchRecord> {
        let keyword: String = keyword.trim().chars().take(MAX_KEYWORD_CHARS).collect();
        if keyword.is_empty() {
            return Err(AppError::InvalidInput("keyword must not be empty".to_string()));
        }

        let record = SearchRecord {
            search_type: SearchType::infer(&keyword, by_author),
            keyword,
            search_time: now,
        };
        self.store
            .record_search(user_id, record.clone(), HISTORY_KEEP)
            .await?;

        tracing::debug!(
            user_id,
            search_type = record.search_type.code(),
            "Recorded search"
        );
        Ok(record)
    }

    /// Newest-first history with one entry per keyword
    pub async fn history(&self, user_id: i64, limit: Option<i64>) -> AppResult<Vec<SearchRecord>> {
        let limit = limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, HISTORY_KEEP as i64) as usize;

        let records = self.store.recent_searches(user_id, HISTORY_KEEP).await?;
        let mut seen = HashSet::new();
        Ok(records
            .into_iter()
            .filter(|record| seen.insert(record.keyword.trim().to_lowercase()))
            .take(limit)
            .collect())
    }
}
