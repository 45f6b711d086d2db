//! Candidate providers
//!
//! Three independent strategies feed the recommendation feed. Each returns an
//! ordered, de-duplicated list of listed works and never fails for lack of
//! personal data: every strategy ends in a popularity fallback.

pub mod affinity;
pub mod ranking;
pub mod search_history;

pub use affinity::AffinityProvider;
pub use ranking::RankingProvider;
pub use search_history::{SearchHistoryProvider, SearchSection};

/// Candidate pool size the affinity strategy scores before cutting
pub const AFFINITY_POOL_SIZE: usize = 60;
/// Matches fetched per search keyword
pub const KEYWORD_MATCH_LIMIT: usize = 8;
/// How many recent distinct keywords drive the search strategy
pub const RECENT_KEYWORD_COUNT: usize = 5;
