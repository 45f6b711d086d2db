use serde::Serialize;

/// Non-feedback preference sources, each joined to the owning work
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    /// Bookshelf entries, one row per collected work
    Collection,
    /// Reading records, counted as distinct chapters read per work
    Reading,
    /// Votes, summed per work
    Vote,
    /// Chapter subscriptions, counted per work
    Subscription,
}

/// One work's contribution from a signal source
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct SignalRow {
    pub category_id: Option<i64>,
    pub tags: Option<String>,
    pub count: i64,
}
