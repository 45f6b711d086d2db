use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use chrono::{DateTime, Utc};

use crate::{
    db::Store,
    error::AppResult,
    models::WorkCandidate,
    services::{
        candidates::{fetch_candidates, rank_by_score},
        preferences::PreferenceScores,
        scoring::affinity_score,
        tags::normalize_tag,
    },
};

use super::AFFINITY_POOL_SIZE;

/// Ranks works from the reader's favourite categories by affinity and popularity
#[derive(Clone)]
pub struct AffinityProvider {
    store: Arc<dyn Store>,
}

impl AffinityProvider {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Builds the "favourite type" section
    ///
    /// Candidates come from `categories` (the reader's top categories, or the
    /// globally popular ones when those are empty). When some candidates share
    /// a tag with `top_tags`, only those are kept; otherwise the tag filter is
    /// dropped.
    pub async fn recommend(
        &self,
        scores: &PreferenceScores,
        categories: &[i64],
        top_tags: &[String],
        limit: usize,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<WorkCandidate>> {
        let store = self.store.as_ref();
        let no_exclusions = HashSet::new();

        let category_scores: HashMap<i64, f64> = if scores.category_scores.is_empty() {
            categories.iter().map(|id| (*id, 1.0)).collect()
        } else {
            scores.category_scores.clone()
        };

        let mut candidates =
            fetch_candidates(store, categories, AFFINITY_POOL_SIZE, &no_exclusions).await?;
        if candidates.is_empty() {
            candidates = fetch_candidates(store, &[], AFFINITY_POOL_SIZE, &no_exclusions).await?;
        }

        let candidates = filter_by_tags(candidates, top_tags);

        let scored = candidates
            .into_iter()
            .map(|work| {
                let score = affinity_score(&work, &category_scores, &scores.tag_scores, now);
                (score, work)
            })
            .collect();
        let results = rank_by_score(scored, limit);

        if results.is_empty() {
            return fetch_candidates(store, &[], limit, &no_exclusions).await;
        }
        Ok(results)
    }
}

/// Keeps candidates sharing a tag with `top_tags`, unless none do
pub fn filter_by_tags(candidates: Vec<WorkCandidate>, top_tags: &[String]) -> Vec<WorkCandidate> {
    let wanted: HashSet<String> = top_tags
        .iter()
        .map(|tag| normalize_tag(tag))
        .filter(|tag| !tag.is_empty())
        .collect();
    if wanted.is_empty() {
        return candidates;
    }

    let (tagged, untagged): (Vec<_>, Vec<_>) = candidates
        .into_iter()
        .partition(|work| work.tags.iter().any(|tag| wanted.contains(&normalize_tag(tag))));

    if tagged.is_empty() {
        untagged
    } else {
        tagged
    }
}
