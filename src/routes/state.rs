use std::sync::Arc;

use crate::{
    db::Store,
    services::{
        feedback::FeedbackService, recommendations::RecommendationService,
        scoring::ScoringConfig, search_history::SearchHistoryService,
    },
};

/// Shared application state
///
/// Holds no per-user data; every service reads fresh from the store.
#[derive(Clone)]
pub struct AppState {
    pub scoring: Arc<ScoringConfig>,
    pub recommendations: RecommendationService,
    pub feedback: FeedbackService,
    pub search_history: SearchHistoryService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, scoring: ScoringConfig) -> Self {
        let scoring = Arc::new(scoring);
        Self {
            recommendations: RecommendationService::new(store.clone(), scoring.clone()),
            feedback: FeedbackService::new(store.clone(), scoring.clone()),
            search_history: SearchHistoryService::new(store),
            scoring,
        }
    }
}
