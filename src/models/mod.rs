pub mod feedback;
pub mod recommendation;
pub mod search;
pub mod signal;
pub mod work;

pub use feedback::{FeedbackEventType, FeedbackMetadata, FeedbackRecord, FeedbackSignal, FeedbackUpsert};
pub use recommendation::{CategoryLabel, RecommendationMeta, RecommendationResponse, UNCATEGORIZED_LABEL};
pub use search::{SearchRecord, SearchType};
pub use signal::{SignalRow, SignalSource};
pub use work::{WorkCandidate, WorkRow, WorkStatus};
