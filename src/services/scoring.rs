//! Scoring weights and the pure formulas built on them.
//!
//! Every weight lives in [`ScoringConfig`], an immutable value shared by the
//! feedback store, the preference aggregator and the candidate providers.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::{
    models::{FeedbackEventType, SignalSource, WorkCandidate},
    services::tags::normalize_tag,
};

/// Weight schedule for preference aggregation and feedback merging
///
/// Loaded from `RECOMMEND_*` environment variables; every field is optional.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub collection_weight: f64,
    pub reading_weight: f64,
    pub vote_weight: f64,
    pub subscription_weight: f64,
    pub feedback_weight: f64,

    pub event_click_weight: f64,
    pub event_view_weight: f64,
    pub event_collect_weight: f64,
    pub event_read_weight: f64,
    pub event_subscribe_weight: f64,
    pub event_vote_weight: f64,

    /// Delta used when the submitted one is missing or unusable
    pub default_delta: f64,
    pub min_delta: f64,
    pub max_delta: f64,
    /// Cap on a feedback row's accumulated weight
    pub max_aggregate_weight: f64,
    pub retention_days: i64,
    pub decay_days: f64,
    pub decay_floor: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            collection_weight: 3.0,
            reading_weight: 1.5,
            vote_weight: 2.5,
            subscription_weight: 3.0,
            feedback_weight: 1.0,
            event_click_weight: 1.0,
            event_view_weight: 1.2,
            event_collect_weight: 3.0,
            event_read_weight: 1.8,
            event_subscribe_weight: 2.5,
            event_vote_weight: 2.8,
            default_delta: 1.0,
            min_delta: 0.05,
            max_delta: 5.0,
            max_aggregate_weight: 60.0,
            retention_days: 180,
            decay_days: 60.0,
            decay_floor: 0.2,
        }
    }
}

impl ScoringConfig {
    /// Rejects schedules that would break the cap or decay arithmetic
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_aggregate_weight <= 0.0 {
            anyhow::bail!("max_aggregate_weight must be positive");
        }
        if self.min_delta <= 0.0 || self.min_delta > self.max_delta {
            anyhow::bail!(
                "delta bounds must satisfy 0 < min ({}) <= max ({})",
                self.min_delta,
                self.max_delta
            );
        }
        if self.default_delta <= 0.0 {
            anyhow::bail!("default_delta must be positive");
        }
        if self.decay_days <= 0.0 || self.retention_days <= 0 {
            anyhow::bail!("decay_days and retention_days must be positive");
        }
        Ok(())
    }

    pub fn source_weight(&self, source: SignalSource) -> f64 {
        match source {
            SignalSource::Collection => self.collection_weight,
            SignalSource::Reading => self.reading_weight,
            SignalSource::Vote => self.vote_weight,
            SignalSource::Subscription => self.subscription_weight,
        }
    }

    pub fn event_weight(&self, event: FeedbackEventType) -> f64 {
        match event {
            FeedbackEventType::Click => self.event_click_weight,
            FeedbackEventType::View => self.event_view_weight,
            FeedbackEventType::Collect => self.event_collect_weight,
            FeedbackEventType::Read => self.event_read_weight,
            FeedbackEventType::Subscribe => self.event_subscribe_weight,
            FeedbackEventType::Vote => self.event_vote_weight,
        }
    }

    /// Contribution of one signal row
    ///
    /// Collections are flat; reading grows with the square root of distinct
    /// chapters read; votes and subscriptions grow linearly with their count.
    pub fn signal_score(&self, source: SignalSource, count: i64) -> f64 {
        let count = count as f64;
        let multiplier = match source {
            SignalSource::Collection => 1.0,
            SignalSource::Reading => count.max(1.0).sqrt().max(1.0),
            SignalSource::Vote | SignalSource::Subscription => count.max(1.0),
        };
        self.source_weight(source) * multiplier
    }

    /// Clamps a numeric delta into `[min_delta, max_delta]` by magnitude
    ///
    /// Sign is preserved. Zero and non-finite values become `default_delta`.
    pub fn normalize_delta(&self, value: f64) -> f64 {
        if !value.is_finite() || value == 0.0 {
            return self.default_delta;
        }
        let magnitude = value.abs().clamp(self.min_delta, self.max_delta);
        if value > 0.0 {
            magnitude
        } else {
            -magnitude
        }
    }

    /// Normalizes a raw request weight of any JSON shape
    pub fn normalize_weight(&self, raw: Option<&Value>) -> f64 {
        let numeric = match raw {
            Some(Value::Number(number)) => number.as_f64(),
            Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
            Some(Value::Bool(flag)) => Some(if *flag { 1.0 } else { 0.0 }),
            _ => None,
        };
        match numeric {
            Some(value) => self.normalize_delta(value),
            None => self.default_delta,
        }
    }

    /// Oldest `event_time` that survives retention
    pub fn retention_horizon(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(self.retention_days)
    }

    /// Linear decay by whole days of age, floored at `decay_floor`
    pub fn decay_factor(&self, event_time: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
        let age_days = (now - event_time).num_days().max(0);
        if age_days == 0 {
            return 1.0;
        }
        (1.0 - age_days as f64 / self.decay_days).max(self.decay_floor)
    }

    /// Score of one feedback row, or `None` when it contributes nothing
    pub fn feedback_score(
        &self,
        event_type: i16,
        weight: f64,
        event_time: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Option<f64> {
        let event = FeedbackEventType::from_code(i64::from(event_type))?;
        let base = self.event_weight(event);
        if base <= 0.0 || !weight.is_finite() || weight <= 0.0 {
            return None;
        }
        Some(base * weight * self.decay_factor(event_time, now) * self.feedback_weight)
    }
}

/// Popularity component: capped vote, collect and read contributions
pub fn popularity_score(work: &WorkCandidate) -> f64 {
    (work.vote_count as f64 / 5.0).min(20.0)
        + (work.collect_count as f64 / 10.0).min(15.0)
        + (work.read_count as f64 / 2000.0).min(15.0)
}

/// Bonus for recently updated works: 10 points on day zero, none after ten days
pub fn freshness_bonus(update_time: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f64 {
    match update_time {
        Some(updated) => {
            let age_days = (now - updated).num_days().max(0);
            (10 - age_days).max(0) as f64
        }
        None => 0.0,
    }
}

/// Composite affinity score of a candidate for one reader
pub fn affinity_score(
    work: &WorkCandidate,
    category_scores: &HashMap<i64, f64>,
    tag_scores: &HashMap<String, f64>,
    now: DateTime<Utc>,
) -> f64 {
    let category = work
        .category_id
        .and_then(|id| category_scores.get(&id))
        .copied()
        .unwrap_or(0.0);
    let tags: f64 = work
        .tags
        .iter()
        .filter_map(|tag| tag_scores.get(&normalize_tag(tag)))
        .sum();

    category + tags + popularity_score(work) + freshness_bonus(work.update_time, now)
}
