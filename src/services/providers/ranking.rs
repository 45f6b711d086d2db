use std::{collections::HashSet, sync::Arc};

use crate::{
    db::Store,
    error::AppResult,
    models::WorkCandidate,
    services::candidates::{fetch_candidates, materialize},
};

/// Categories used when the reader has no favorites
const POPULAR_CATEGORY_COUNT: usize = 3;

/// Recommends chart-topping works from the reader's favorite categories
#[derive(Clone)]
pub struct RankingProvider {
    store: Arc<dyn Store>,
}

impl RankingProvider {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Builds the "top of your favorite categories" section
    ///
    /// Each category contributes up to `limit_per_category` works from its
    /// latest ranking snapshot, falling back to the general boards when the
    /// category has none. Shortfalls are backfilled by popularity.
    pub async fn recommend(
        &self,
        categories: &[i64],
        limit_per_category: usize,
        exclude: &HashSet<i64>,
    ) -> AppResult<Vec<WorkCandidate>> {
        let store = self.store.as_ref();

        let categories = if categories.is_empty() {
            store.popular_categories(POPULAR_CATEGORY_COUNT).await?
        } else {
            categories.to_vec()
        };
        let names = store.category_names(&categories).await?;

        let mut seen = exclude.clone();
        let mut works: Vec<WorkCandidate> = Vec::new();
        let mut general = None;

        for category_id in &categories {
            let mut rows = store
                .ranking_rows(Some(*category_id), limit_per_category * 3)
                .await?;
            if rows.is_empty() {
                if general.is_none() {
                    general = Some(store.ranking_rows(None, limit_per_category * 4).await?);
                }
                rows = general.clone().unwrap_or_default();
            }

            // Works keep their own category name unless this one resolves
            let label = names.get(category_id).filter(|name| !name.is_empty());
            for mut work in materialize(rows, &seen, limit_per_category) {
                seen.insert(work.work_id);
                if let Some(label) = label {
                    work.category_name = label.clone();
                }
                works.push(work);
            }
        }

        let expected = limit_per_category * categories.len().max(1);
        if works.len() < expected {
            let extra =
                fetch_candidates(store, &categories, expected - works.len(), &seen).await?;
            for work in extra {
                seen.insert(work.work_id);
                works.push(work);
            }
        }

        if works.is_empty() {
            works = fetch_candidates(store, &[], limit_per_category * 2, exclude).await?;
        }

        tracing::debug!(
            categories = categories.len(),
            works = works.len(),
            "Ranking section built"
        );

        Ok(works)
    }
}
