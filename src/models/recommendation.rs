use serde::Serialize;

use super::WorkCandidate;

/// Display label used when a category name cannot be resolved
pub const UNCATEGORIZED_LABEL: &str = "未分类";

/// Category identity with its resolved display name
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CategoryLabel {
    pub category_id: i64,
    pub name: String,
}

/// Describes how personalized the feed turned out to be
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationMeta {
    pub is_personalized: bool,
    pub has_search_history: bool,
    pub top_categories: Vec<CategoryLabel>,
    pub popular_categories: Vec<CategoryLabel>,
    pub top_tags: Vec<String>,
}

/// The three-section recommendation feed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RecommendationResponse {
    pub favorite_type_works: Vec<WorkCandidate>,
    pub search_similar_works: Vec<WorkCandidate>,
    pub favorite_rank_works: Vec<WorkCandidate>,
    pub meta: RecommendationMeta,
}

impl RecommendationResponse {
    /// All work ids in section order
    pub fn work_ids(&self) -> Vec<i64> {
        self.favorite_type_works
            .iter()
            .chain(&self.search_similar_works)
            .chain(&self.favorite_rank_works)
            .map(|work| work.work_id)
            .collect()
    }
}
