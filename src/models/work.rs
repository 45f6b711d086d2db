use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::tags::parse_tags_field;

/// Publication status of a work
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkStatus {
    Draft,
    Serializing,
    Completed,
    Removed,
}

impl WorkStatus {
    /// Status codes of works that may be recommended
    pub const LISTED_CODES: [i16; 2] = [1, 2];

    pub fn code(self) -> i16 {
        match self {
            WorkStatus::Draft => 0,
            WorkStatus::Serializing => 1,
            WorkStatus::Completed => 2,
            WorkStatus::Removed => 3,
        }
    }

    /// Only serializing and completed works are visible to readers
    pub fn is_listed(self) -> bool {
        Self::LISTED_CODES.contains(&self.code())
    }
}

/// Work joined with its category and author, as returned by the storage layer
///
/// `tags` is the raw column value: a JSON array or a delimiter-separated string.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct WorkRow {
    pub work_id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub intro: Option<String>,
    pub tags: Option<String>,
    pub category_id: Option<i64>,
    pub category_name: String,
    pub read_count: i64,
    pub collect_count: i64,
    pub vote_count: i64,
    pub update_time: Option<DateTime<Utc>>,
    pub author_name: String,
}

/// A work under consideration for a recommendation section
///
/// Serialized as-is into the response; internal scores never leave the service.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkCandidate {
    pub work_id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub intro: String,
    pub tags: Vec<String>,
    pub category_id: Option<i64>,
    pub category_name: String,
    pub read_count: i64,
    pub collect_count: i64,
    pub vote_count: i64,
    pub update_time: Option<DateTime<Utc>>,
    pub author_name: String,
    pub rating: Option<f64>,
}

impl From<WorkRow> for WorkCandidate {
    fn from(row: WorkRow) -> Self {
        Self {
            work_id: row.work_id,
            title: row.title,
            cover_url: row.cover_url,
            intro: row.intro.unwrap_or_default(),
            tags: parse_tags_field(row.tags.as_deref()),
            category_id: row.category_id,
            category_name: row.category_name,
            read_count: row.read_count.max(0),
            collect_count: row.collect_count.max(0),
            vote_count: row.vote_count.max(0),
            update_time: row.update_time,
            author_name: row.author_name,
            rating: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> WorkRow {
        WorkRow {
            work_id: 7,
            title: "剑来".to_string(),
            cover_url: None,
            intro: None,
            tags: Some(r#"["仙侠", " 热血 "]"#.to_string()),
            category_id: Some(2),
            category_name: "仙侠".to_string(),
            read_count: 1200,
            collect_count: -3,
            vote_count: 40,
            update_time: None,
            author_name: "烽火".to_string(),
        }
    }

    #[test]
    fn test_candidate_from_row_parses_tags() {
        let candidate = WorkCandidate::from(row());
        assert_eq!(candidate.tags, vec!["仙侠", "热血"]);
        assert_eq!(candidate.intro, "");
        assert_eq!(candidate.rating, None);
    }

    #[test]
    fn test_candidate_from_row_clamps_negative_counters() {
        let candidate = WorkCandidate::from(row());
        assert_eq!(candidate.collect_count, 0);
    }

    #[test]
    fn test_listed_statuses() {
        assert!(WorkStatus::Serializing.is_listed());
        assert!(WorkStatus::Completed.is_listed());
        assert!(!WorkStatus::Draft.is_listed());
        assert!(!WorkStatus::Removed.is_listed());
    }

    #[test]
    fn test_candidate_serializes_null_rating() {
        let json = serde_json::to_value(WorkCandidate::from(row())).unwrap();
        assert!(json["rating"].is_null());
        assert_eq!(json["work_id"], 7);
    }
}
