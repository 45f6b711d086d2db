use axum::{extract::State, Extension, Json};
use serde_json::{json, Map, Value};

use crate::{
    error::{AppError, AppResult},
    middleware::{CurrentUser, RequestId},
    models::{FeedbackEventType, FeedbackMetadata, RecommendationResponse},
    services::scoring::ScoringConfig,
};

use super::AppState;

/// Top-level body fields folded into feedback metadata
const METADATA_FIELDS: [&str; 5] = ["source", "slot", "section", "position", "query"];

/// A validated feedback submission
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackRequest {
    pub work_id: i64,
    pub event_type: FeedbackEventType,
    pub weight: f64,
    pub metadata: Option<FeedbackMetadata>,
}

impl FeedbackRequest {
    /// Validates a loosely-typed feedback body
    ///
    /// Only the work id and event type can be rejected; weight and metadata
    /// always normalize to something usable.
    pub fn from_body(body: &Value, scoring: &ScoringConfig) -> AppResult<Self> {
        let work_id = match body.get("work_id") {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) if raw.trim().is_empty() => None,
            Some(value) => Some(parse_work_id(value)?),
        }
        .ok_or_else(|| AppError::InvalidInput("work_id is required".to_string()))?;

        let event_type = ["event", "event_type"]
            .iter()
            .filter_map(|key| body.get(*key))
            .find(|value| is_present(value))
            .and_then(FeedbackEventType::from_json)
            .ok_or_else(|| AppError::InvalidInput("unknown feedback event".to_string()))?;

        Ok(Self {
            work_id,
            event_type,
            weight: scoring.normalize_weight(body.get("weight")),
            metadata: collect_metadata(body),
        })
    }
}

/// Integers and numeric strings are taken as-is; JSON floats are truncated
fn parse_work_id(value: &Value) -> AppResult<i64> {
    let parsed = match value {
        Value::Number(number) => number.as_i64().or_else(|| {
            number
                .as_f64()
                .filter(|id| id.is_finite() && id.abs() < i64::MAX as f64)
                .map(|id| id.trunc() as i64)
        }),
        Value::String(raw) => raw.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| AppError::InvalidInput("invalid work_id".to_string()))
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(raw) => !raw.is_empty(),
        _ => true,
    }
}

fn collect_metadata(body: &Value) -> Option<FeedbackMetadata> {
    let mut metadata = Map::new();
    for key in METADATA_FIELDS {
        if let Some(value) = body.get(key).filter(|value| is_present(value)) {
            metadata.insert(key.to_string(), value.clone());
        }
    }

    match body.get("metadata") {
        Some(Value::Object(object)) => metadata.extend(object.clone()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(object)) => metadata.extend(object),
            _ => {
                metadata.insert("raw".to_string(), Value::String(raw.clone()));
            }
        },
        _ => {}
    }

    (!metadata.is_empty()).then_some(metadata)
}

/// Builds the three-section feed for the current reader
pub async fn feed(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
) -> AppResult<Json<RecommendationResponse>> {
    tracing::info!(%request_id, user_id, "Building recommendations");

    let response = state.recommendations.build(user_id).await?;

    tracing::info!(
        %request_id,
        user_id,
        is_personalized = response.meta.is_personalized,
        works = response.work_ids().len(),
        "Recommendations built"
    );
    Ok(Json(response))
}

/// Records one feedback event from the feed UI
pub async fn record_feedback(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    CurrentUser(user_id): CurrentUser,
    Json(body): Json<Value>,
) -> AppResult<Json<Value>> {
    let request = FeedbackRequest::from_body(&body, &state.scoring)?;
    tracing::info!(
        %request_id,
        user_id,
        work_id = request.work_id,
        event = %request.event_type,
        "Recording feedback"
    );

    state
        .feedback
        .record(
            user_id,
            request.work_id,
            Some(request.event_type),
            Some(request.weight),
            request.metadata,
        )
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: Value) -> AppResult<FeedbackRequest> {
        FeedbackRequest::from_body(&body, &ScoringConfig::default())
    }

    #[test]
    fn test_work_id_accepts_numeric_strings() {
        let request = parse(json!({ "work_id": " 12 ", "event": "Click" })).unwrap();
        assert_eq!(request.work_id, 12);
        assert_eq!(request.event_type, FeedbackEventType::Click);
        assert_eq!(request.weight, 1.0);
        assert_eq!(request.metadata, None);
    }

    #[test]
    fn test_float_work_id_is_truncated() {
        let request = parse(json!({ "work_id": 12.5, "event": "view" })).unwrap();
        assert_eq!(request.work_id, 12);
        assert!(matches!(
            parse(json!({ "work_id": "12.5", "event": "view" })),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_rejects_missing_or_bad_work_id() {
        assert!(matches!(parse(json!({ "event": "view" })), Err(AppError::InvalidInput(_))));
        assert!(matches!(
            parse(json!({ "work_id": "abc", "event": "view" })),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_event_falls_back_to_event_type_and_codes() {
        let request = parse(json!({ "work_id": 3, "event": "", "event_type": 6 })).unwrap();
        assert_eq!(request.event_type, FeedbackEventType::Vote);
        assert!(matches!(
            parse(json!({ "work_id": 3, "event": "share" })),
            Err(AppError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_metadata_merges_extra_fields() {
        let request = parse(json!({
            "work_id": 3,
            "event": "read",
            "weight": "abc",
            "source": "home",
            "slot": "",
            "metadata": "{\"source\": \"feed\", \"rank\": 2}"
        }))
        .unwrap();
        assert_eq!(request.weight, 1.0);
        let metadata = request.metadata.unwrap();
        assert_eq!(metadata["source"], "feed");
        assert_eq!(metadata["rank"], 2);
        assert!(!metadata.contains_key("slot"));
    }

    #[test]
    fn test_unparseable_metadata_string_kept_raw() {
        let request = parse(json!({ "work_id": 3, "event": "view", "metadata": "clicked" })).unwrap();
        assert_eq!(request.metadata.unwrap()["raw"], "clicked");
    }
}
