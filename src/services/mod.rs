pub mod candidates;
pub mod feedback;
pub mod preferences;
pub mod providers;
pub mod recommendations;
pub mod scoring;
pub mod search_history;
pub mod tags;

pub use feedback::FeedbackService;
pub use preferences::{PreferenceAggregator, PreferenceScores};
pub use recommendations::RecommendationService;
pub use scoring::ScoringConfig;
pub use search_history::SearchHistoryService;
