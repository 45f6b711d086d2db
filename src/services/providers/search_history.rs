use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    db::Store,
    error::AppResult,
    models::WorkCandidate,
    services::{
        candidates::{fetch_candidates, materialize, work_ids},
        search_history::distinct_keywords,
    },
};

use super::{KEYWORD_MATCH_LIMIT, RECENT_KEYWORD_COUNT};

/// Search records scanned to find the recent distinct keywords
const KEYWORD_SCAN_LIMIT: usize = 20;

/// Output of the search-history strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchSection {
    pub works: Vec<WorkCandidate>,
    /// Whether the reader has searched at all, regardless of matches
    pub has_search_history: bool,
}

struct Hit {
    work: WorkCandidate,
    weight: i64,
}

/// Recommends works matching the reader's recent search keywords
#[derive(Clone)]
pub struct SearchHistoryProvider {
    store: Arc<dyn Store>,
}

impl SearchHistoryProvider {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Builds the "similar to your searches" section
    ///
    /// More recent keywords weigh more (`max(1, 5 - index)`). Short results are
    /// topped up with popular works from `fallback_categories`, then from the
    /// whole catalog.
    pub async fn recommend(
        &self,
        user_id: i64,
        fallback_categories: &[i64],
        limit: usize,
        exclude: &HashSet<i64>,
    ) -> AppResult<SearchSection> {
        let store = self.store.as_ref();

        let records = store.recent_searches(user_id, KEYWORD_SCAN_LIMIT).await?;
        if records.is_empty() {
            return Ok(SearchSection::default());
        }
        let keywords: Vec<String> = distinct_keywords(&records)
            .into_iter()
            .take(RECENT_KEYWORD_COUNT)
            .collect();

        let mut hits: Vec<Hit> = Vec::new();
        let mut positions: HashMap<i64, usize> = HashMap::new();

        'keywords: for (index, keyword) in keywords.iter().enumerate() {
            if keyword.is_empty() {
                continue;
            }
            let weight = (RECENT_KEYWORD_COUNT as i64 - index as i64).max(1);
            let rows = store.keyword_matches(keyword, KEYWORD_MATCH_LIMIT).await?;

            for work in materialize(rows, exclude, KEYWORD_MATCH_LIMIT) {
                match positions.get(&work.work_id) {
                    Some(&position) => hits[position].weight += weight,
                    None => {
                        positions.insert(work.work_id, hits.len());
                        hits.push(Hit { work, weight });
                    }
                }
                if hits.len() >= limit * 2 {
                    break 'keywords;
                }
            }
        }

        hits.sort_by(|a, b| {
            b.weight
                .cmp(&a.weight)
                .then(b.work.vote_count.cmp(&a.work.vote_count))
                .then(b.work.read_count.cmp(&a.work.read_count))
        });
        let mut works: Vec<WorkCandidate> = hits.into_iter().take(limit).map(|hit| hit.work).collect();

        tracing::debug!(
            user_id,
            keywords = keywords.len(),
            matched = works.len(),
            "Search history matches"
        );

        if works.len() < limit {
            let mut used: HashSet<i64> = exclude.union(&work_ids(&works)).copied().collect();
            let mut extra = Vec::new();
            if !fallback_categories.is_empty() {
                extra = fetch_candidates(store, fallback_categories, limit, &used).await?;
            }
            if extra.is_empty() {
                extra = fetch_candidates(store, &[], limit, &used).await?;
            }
            for work in extra {
                if works.len() >= limit {
                    break;
                }
                if used.insert(work.work_id) {
                    works.push(work);
                }
            }
        }

        Ok(SearchSection {
            works,
            has_search_history: true,
        })
    }
}
