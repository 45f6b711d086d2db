use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    db::Store,
    error::AppResult,
    models::{SignalRow, SignalSource},
    services::{
        scoring::ScoringConfig,
        tags::{normalize_tag, parse_tags_field},
    },
};

/// Per-user category and tag affinities, recomputed on every request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PreferenceScores {
    pub category_scores: HashMap<i64, f64>,
    /// Keyed by normalized (trimmed, lowercase) tag
    pub tag_scores: HashMap<String, f64>,
    /// Normalized tag to the first casing seen
    pub tag_display: HashMap<String, String>,
    pub has_signal: bool,
}

impl PreferenceScores {
    /// Adds `score` to the work's category and to each of its tags
    pub fn accumulate(&mut self, category_id: Option<i64>, tags_field: Option<&str>, score: f64) {
        if let Some(category_id) = category_id {
            *self.category_scores.entry(category_id).or_default() += score;
        }
        for tag in parse_tags_field(tags_field) {
            let normalized = normalize_tag(&tag);
            if normalized.is_empty() {
                continue;
            }
            *self.tag_scores.entry(normalized.clone()).or_default() += score;
            self.tag_display.entry(normalized).or_insert(tag);
        }
    }

    /// Highest-scoring categories, ties broken by ascending id
    pub fn top_categories(&self, limit: usize) -> Vec<i64> {
        top_keys(&self.category_scores, limit)
    }

    /// Highest-scoring normalized tags, ties broken alphabetically
    pub fn top_tags(&self, limit: usize) -> Vec<String> {
        top_keys(&self.tag_scores, limit)
    }

    /// Display form of a normalized tag
    pub fn display_tag(&self, normalized: &str) -> String {
        self.tag_display
            .get(normalized)
            .cloned()
            .unwrap_or_else(|| normalized.to_string())
    }
}

/// Sorts by descending score then ascending key and keeps the first `limit`
pub fn top_keys<K: Ord + Clone>(scores: &HashMap<K, f64>, limit: usize) -> Vec<K> {
    let mut items: Vec<(&K, &f64)> = scores.iter().collect();
    items.sort_by(|(key_a, score_a), (key_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| key_a.cmp(key_b))
    });
    items.into_iter().take(limit).map(|(key, _)| key.clone()).collect()
}

/// Turns a user's raw signals into affinity scores
#[derive(Clone)]
pub struct PreferenceAggregator {
    store: Arc<dyn Store>,
    config: Arc<ScoringConfig>,
}

impl PreferenceAggregator {
    pub fn new(store: Arc<dyn Store>, config: Arc<ScoringConfig>) -> Self {
        Self { store, config }
    }

    pub async fn compute(&self, user_id: i64) -> AppResult<PreferenceScores> {
        self.compute_at(user_id, Utc::now()).await
    }

    /// Reads all five signal sources and folds them into one score set
    ///
    /// Feedback rows past the retention horizon are ignored even if no write
    /// has purged them yet.
    pub async fn compute_at(&self, user_id: i64, now: DateTime<Utc>) -> AppResult<PreferenceScores> {
        let store = self.store.as_ref();
        let (collections, readings, votes, subscriptions, feedback) = tokio::try_join!(
            store.signal_rows(user_id, SignalSource::Collection),
            store.signal_rows(user_id, SignalSource::Reading),
            store.signal_rows(user_id, SignalSource::Vote),
            store.signal_rows(user_id, SignalSource::Subscription),
            store.feedback_signals(user_id),
        )?;

        let mut scores = PreferenceScores::default();

        let sources: [(SignalSource, Vec<SignalRow>); 4] = [
            (SignalSource::Collection, collections),
            (SignalSource::Reading, readings),
            (SignalSource::Vote, votes),
            (SignalSource::Subscription, subscriptions),
        ];
        for (source, rows) in sources {
            for row in rows {
                scores.has_signal = true;
                let score = self.config.signal_score(source, row.count);
                scores.accumulate(row.category_id, row.tags.as_deref(), score);
            }
        }

        let horizon = self.config.retention_horizon(now);
        for row in feedback.into_iter().filter(|row| row.event_time >= horizon) {
            scores.has_signal = true;
            match self
                .config
                .feedback_score(row.event_type, row.weight, row.event_time, now)
            {
                Some(score) => scores.accumulate(row.category_id, row.tags.as_deref(), score),
                None => tracing::debug!(
                    user_id,
                    event_type = row.event_type,
                    weight = row.weight,
                    "Skipping feedback row without contribution"
                ),
            }
        }

        tracing::debug!(
            user_id,
            has_signal = scores.has_signal,
            categories = scores.category_scores.len(),
            tags = scores.tag_scores.len(),
            "Computed preference scores"
        );

        Ok(scores)
    }
}
