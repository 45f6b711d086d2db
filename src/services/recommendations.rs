use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    db::Store,
    error::AppResult,
    models::{CategoryLabel, RecommendationMeta, RecommendationResponse, UNCATEGORIZED_LABEL},
    services::{
        candidates::{fetch_candidates, work_ids},
        preferences::PreferenceAggregator,
        providers::{AffinityProvider, RankingProvider, SearchHistoryProvider, SearchSection},
        scoring::ScoringConfig,
    },
};

const TOP_CATEGORY_COUNT: usize = 3;
const TOP_TAG_COUNT: usize = 5;
const POPULAR_CATEGORY_COUNT: usize = 3;
const FAVORITE_TYPE_LIMIT: usize = 9;
const SEARCH_SIMILAR_LIMIT: usize = 8;
const RANK_PER_CATEGORY: usize = 3;
const RANK_FALLBACK_LIMIT: usize = 9;

/// Builds the three-section recommendation feed for a reader
///
/// Sections are filled in order and every later section excludes the works
/// already chosen by earlier ones, so no work appears twice in one feed.
#[derive(Clone)]
pub struct RecommendationService {
    store: Arc<dyn Store>,
    aggregator: PreferenceAggregator,
    affinity: AffinityProvider,
    search: SearchHistoryProvider,
    ranking: RankingProvider,
}

impl RecommendationService {
    pub fn new(store: Arc<dyn Store>, config: Arc<ScoringConfig>) -> Self {
        Self {
            aggregator: PreferenceAggregator::new(store.clone(), config),
            affinity: AffinityProvider::new(store.clone()),
            search: SearchHistoryProvider::new(store.clone()),
            ranking: RankingProvider::new(store.clone()),
            store,
        }
    }

    pub async fn build(&self, user_id: i64) -> AppResult<RecommendationResponse> {
        self.build_at(user_id, Utc::now()).await
    }

    pub async fn build_at(
        &self,
        user_id: i64,
        now: DateTime<Utc>,
    ) -> AppResult<RecommendationResponse> {
        let store = self.store.as_ref();
        let (scores, popular_categories) = tokio::try_join!(
            self.aggregator.compute_at(user_id, now),
            store.popular_categories(POPULAR_CATEGORY_COUNT),
        )?;

        let is_personalized = scores.has_signal;
        let (top_categories, top_tag_keys) = if is_personalized {
            (
                scores.top_categories(TOP_CATEGORY_COUNT),
                scores.top_tags(TOP_TAG_COUNT),
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let fallback_categories = if top_categories.is_empty() {
            popular_categories.clone()
        } else {
            top_categories.clone()
        };

        let mut used: HashSet<i64> = HashSet::new();

        let mut favorite_type_works = Vec::new();
        if is_personalized {
            favorite_type_works = self
                .affinity
                .recommend(
                    &scores,
                    &fallback_categories,
                    &top_tag_keys,
                    FAVORITE_TYPE_LIMIT,
                    now,
                )
                .await?;
            if favorite_type_works.is_empty() {
                favorite_type_works =
                    fetch_candidates(store, &[], FAVORITE_TYPE_LIMIT, &used).await?;
            }
            used.extend(work_ids(&favorite_type_works));
        }

        let SearchSection {
            works: search_similar_works,
            has_search_history,
        } = self
            .search
            .recommend(user_id, &fallback_categories, SEARCH_SIMILAR_LIMIT, &used)
            .await?;
        used.extend(work_ids(&search_similar_works));

        let mut favorite_rank_works = self
            .ranking
            .recommend(&fallback_categories, RANK_PER_CATEGORY, &used)
            .await?;
        if favorite_rank_works.is_empty() {
            favorite_rank_works =
                fetch_candidates(store, &fallback_categories, RANK_FALLBACK_LIMIT, &used).await?;
        }
        if favorite_rank_works.is_empty() {
            favorite_rank_works = fetch_candidates(store, &[], RANK_FALLBACK_LIMIT, &used).await?;
        }

        let mut lookup = top_categories.clone();
        lookup.extend(fallback_categories.iter().copied());
        let names = store.category_names(&lookup).await?;
        let label = |category_id: &i64| CategoryLabel {
            category_id: *category_id,
            name: names
                .get(category_id)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| UNCATEGORIZED_LABEL.to_string()),
        };

        let meta = RecommendationMeta {
            is_personalized,
            has_search_history,
            top_categories: top_categories.iter().map(label).collect(),
            popular_categories: fallback_categories.iter().map(label).collect(),
            top_tags: top_tag_keys
                .iter()
                .map(|tag| scores.display_tag(tag))
                .collect(),
        };

        tracing::debug!(
            user_id,
            backend = store.name(),
            is_personalized,
            has_search_history,
            favorite_type = favorite_type_works.len(),
            search_similar = search_similar_works.len(),
            favorite_rank = favorite_rank_works.len(),
            "Built recommendation feed"
        );

        Ok(RecommendationResponse {
            favorite_type_works,
            search_similar_works,
            favorite_rank_works,
            meta,
        })
    }
}
