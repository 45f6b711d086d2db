use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    db::Store,
    error::AppResult,
    models::{FeedbackEventType, FeedbackMetadata, FeedbackUpsert},
    services::scoring::ScoringConfig,
};

/// Write path for implicit feedback events
///
/// Each call merges into the `(user, work, event_type)` row with a capped,
/// monotonically growing weight and purges the user's expired rows.
#[derive(Clone)]
pub struct FeedbackService {
    store: Arc<dyn Store>,
    config: Arc<ScoringConfig>,
}

impl FeedbackService {
    pub fn new(store: Arc<dyn Store>, config: Arc<ScoringConfig>) -> Self {
        Self { store, config }
    }

    /// Records one feedback event
    ///
    /// Missing user, work or event type makes this a no-op so hooks can call
    /// it unconditionally. A missing, zero, non-finite or negative delta is
    /// replaced by the configured default.
    pub async fn record(
        &self,
        user_id: i64,
        work_id: i64,
        event_type: Option<FeedbackEventType>,
        weight_delta: Option<f64>,
        metadata: Option<FeedbackMetadata>,
    ) -> AppResult<()> {
        self.record_at(user_id, work_id, event_type, weight_delta, metadata, Utc::now())
            .await
    }

    pub async fn record_at(
        &self,
        user_id: i64,
        work_id: i64,
        event_type: Option<FeedbackEventType>,
        weight_delta: Option<f64>,
        metadata: Option<FeedbackMetadata>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let Some(event_type) = event_type.filter(|_| user_id > 0 && work_id > 0) else {
            tracing::debug!(user_id, work_id, "Skipping feedback without user, work or event");
            return Ok(());
        };

        let mut delta = self
            .config
            .normalize_delta(weight_delta.unwrap_or(self.config.default_delta));
        if delta <= 0.0 {
            delta = self.config.default_delta;
        }

        let upsert = FeedbackUpsert {
            user_id,
            work_id,
            event_type,
            delta,
            cap: self.config.max_aggregate_weight,
            metadata: metadata.filter(|metadata| !metadata.is_empty()),
            event_time: now,
        };

        tracing::debug!(
            user_id,
            work_id,
            event = %event_type,
            delta,
            "Recording recommendation feedback"
        );

        self.store
            .upsert_feedback(upsert, self.config.retention_horizon(now))
            .await
    }
}
