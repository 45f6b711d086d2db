use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of implicit feedback a reader produced for a work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackEventType {
    Click,
    View,
    Collect,
    Read,
    Subscribe,
    Vote,
}

impl FeedbackEventType {
    pub const ALL: [FeedbackEventType; 6] = [
        FeedbackEventType::Click,
        FeedbackEventType::View,
        FeedbackEventType::Collect,
        FeedbackEventType::Read,
        FeedbackEventType::Subscribe,
        FeedbackEventType::Vote,
    ];

    /// Stored numeric code
    pub fn code(self) -> i16 {
        match self {
            FeedbackEventType::Click => 1,
            FeedbackEventType::View => 2,
            FeedbackEventType::Collect => 3,
            FeedbackEventType::Read => 4,
            FeedbackEventType::Subscribe => 5,
            FeedbackEventType::Vote => 6,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|event| i64::from(event.code()) == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackEventType::Click => "click",
            FeedbackEventType::View => "view",
            FeedbackEventType::Collect => "collect",
            FeedbackEventType::Read => "read",
            FeedbackEventType::Subscribe => "subscribe",
            FeedbackEventType::Vote => "vote",
        }
    }

    /// Resolves a request value: an alias (any case) or a numeric code
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(raw) => raw.parse().ok(),
            Value::Number(number) => {
                if let Some(code) = number.as_i64() {
                    Self::from_code(code)
                } else {
                    number
                        .as_f64()
                        .filter(|code| code.fract() == 0.0)
                        .and_then(|code| Self::from_code(code as i64))
                }
            }
            _ => None,
        }
    }
}

impl Display for FeedbackEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FeedbackEventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        if let Some(event) = Self::ALL.into_iter().find(|event| event.as_str() == key) {
            return Ok(event);
        }
        key.parse::<i64>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| format!("unknown feedback event: {}", s))
    }
}

/// Opaque key/value bag attached to a feedback row
pub type FeedbackMetadata = Map<String, Value>;

/// One merge into the `(user_id, work_id, event_type)` feedback row
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackUpsert {
    pub user_id: i64,
    pub work_id: i64,
    pub event_type: FeedbackEventType,
    /// Normalized weight delta
    pub delta: f64,
    /// Upper bound for the merged weight
    pub cap: f64,
    /// `None` keeps whatever metadata the row already has
    pub metadata: Option<FeedbackMetadata>,
    pub event_time: DateTime<Utc>,
}

/// Persisted feedback row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedbackRecord {
    pub user_id: i64,
    pub work_id: i64,
    pub event_type: FeedbackEventType,
    pub weight: f64,
    pub event_time: DateTime<Utc>,
    pub metadata: Option<FeedbackMetadata>,
}

impl FeedbackRecord {
    /// Applies an upsert to an existing row with the capped merge rules
    pub fn merge(&mut self, upsert: &FeedbackUpsert) {
        self.weight = (self.weight + upsert.delta).min(upsert.cap);
        if upsert.delta > 0.0 {
            self.event_time = self.event_time.max(upsert.event_time);
            if let Some(metadata) = &upsert.metadata {
                self.metadata = Some(metadata.clone());
            }
        }
    }
}

impl From<&FeedbackUpsert> for FeedbackRecord {
    fn from(upsert: &FeedbackUpsert) -> Self {
        Self {
            user_id: upsert.user_id,
            work_id: upsert.work_id,
            event_type: upsert.event_type,
            weight: upsert.delta.min(upsert.cap),
            event_time: upsert.event_time,
            metadata: upsert.metadata.clone(),
        }
    }
}

/// Feedback row joined to its work's category and tags, as read by the aggregator
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct FeedbackSignal {
    pub category_id: Option<i64>,
    pub tags: Option<String>,
    pub event_type: i16,
    pub weight: f64,
    pub event_time: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn upsert(delta: f64, at: DateTime<Utc>, metadata: Option<FeedbackMetadata>) -> FeedbackUpsert {
        FeedbackUpsert {
            user_id: 1,
            work_id: 2,
            event_type: FeedbackEventType::Read,
            delta,
            cap: 60.0,
            metadata,
            event_time: at,
        }
    }

    #[test]
    fn test_event_aliases_are_case_insensitive() {
        assert_eq!("Collect".parse::<FeedbackEventType>(), Ok(FeedbackEventType::Collect));
        assert_eq!(" VOTE ".parse::<FeedbackEventType>(), Ok(FeedbackEventType::Vote));
        assert_eq!("4".parse::<FeedbackEventType>(), Ok(FeedbackEventType::Read));
        assert!("like".parse::<FeedbackEventType>().is_err());
        assert!("9".parse::<FeedbackEventType>().is_err());
    }

    #[test]
    fn test_event_from_json_number() {
        assert_eq!(FeedbackEventType::from_json(&json!(5)), Some(FeedbackEventType::Subscribe));
        assert_eq!(FeedbackEventType::from_json(&json!(2.0)), Some(FeedbackEventType::View));
        assert_eq!(FeedbackEventType::from_json(&json!(2.5)), None);
        assert_eq!(FeedbackEventType::from_json(&json!(null)), None);
    }

    #[test]
    fn test_merge_caps_weight() {
        let now = Utc::now();
        let mut record = FeedbackRecord::from(&upsert(5.0, now, None));
        for _ in 0..20 {
            record.merge(&upsert(5.0, now, None));
        }
        assert_eq!(record.weight, 60.0);
    }

    #[test]
    fn test_merge_keeps_metadata_when_new_is_absent() {
        let earlier = Utc::now() - Duration::hours(1);
        let mut metadata = FeedbackMetadata::new();
        metadata.insert("chapter_id".to_string(), json!(12));
        let mut record = FeedbackRecord::from(&upsert(1.0, earlier, Some(metadata.clone())));

        let now = Utc::now();
        record.merge(&upsert(1.0, now, None));
        assert_eq!(record.metadata, Some(metadata));
        assert_eq!(record.event_time, now);
        assert_eq!(record.weight, 2.0);
    }

    #[test]
    fn test_non_positive_merge_leaves_time_and_metadata() {
        let earlier = Utc::now() - Duration::hours(1);
        let mut record = FeedbackRecord::from(&upsert(3.0, earlier, None));

        let mut metadata = FeedbackMetadata::new();
        metadata.insert("source".to_string(), json!("home"));
        record.merge(&upsert(-1.0, Utc::now(), Some(metadata)));

        assert_eq!(record.weight, 2.0);
        assert_eq!(record.event_time, earlier);
        assert_eq!(record.metadata, None);
    }
}
