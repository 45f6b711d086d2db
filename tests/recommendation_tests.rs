use std::{collections::HashSet, sync::Arc};

use chrono::{Duration, Utc};
use serde_json::json;

use serial_api::{
    db::{MemoryStore, Store, WorkRecord},
    models::{FeedbackEventType, FeedbackRecord, SearchRecord, SearchType},
    services::{
        tags::parse_tags_field, FeedbackService, PreferenceAggregator, RecommendationService,
        ScoringConfig,
    },
};

fn config() -> Arc<ScoringConfig> {
    Arc::new(ScoringConfig::default())
}

async fn catalog(size: i64) -> MemoryStore {
    let store = MemoryStore::new();
    for category in 1..=4 {
        store.add_category(category, format!("category {}", category)).await;
    }
    for id in 1..=size {
        store
            .add_work(
                WorkRecord::new(id, format!("Story {}", id), Some(id % 4 + 1))
                    .tags(if id % 3 == 0 { "仙侠|穿越" } else { "都市" })
                    .counts(id * 10, id % 7, (size - id) % 11),
            )
            .await;
    }
    store
}

fn feedback(user_id: i64, work_id: i64, days_ago: i64) -> FeedbackRecord {
    FeedbackRecord {
        user_id,
        work_id,
        event_type: FeedbackEventType::Read,
        weight: 1.0,
        event_time: Utc::now() - Duration::days(days_ago),
        metadata: None,
    }
}

#[tokio::test]
async fn test_repeated_feedback_never_exceeds_cap() {
    let store = catalog(5).await;
    let service = FeedbackService::new(Arc::new(store.clone()), config());

    for _ in 0..40 {
        service
            .record(1, 2, Some(FeedbackEventType::Vote), Some(1000.0), None)
            .await
            .unwrap();
    }

    let rows = store.feedback_rows(1).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].weight, 60.0);
}

#[tokio::test]
async fn test_dirty_weights_default_to_one() {
    let scoring = ScoringConfig::default();
    let store = catalog(5).await;
    let service = FeedbackService::new(Arc::new(store.clone()), config());

    let raw_weights = [json!(0), json!("heavy")];
    for (offset, raw) in raw_weights.iter().enumerate() {
        let weight = scoring.normalize_weight(Some(raw));
        assert_eq!(weight, 1.0);
        service
            .record(1, offset as i64 + 1, Some(FeedbackEventType::Click), Some(weight), None)
            .await
            .unwrap();
    }
    service
        .record(1, 3, Some(FeedbackEventType::Click), Some(f64::NAN), None)
        .await
        .unwrap();

    let rows = store.feedback_rows(1).await;
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| row.weight == 1.0));
}

#[tokio::test]
async fn test_retention_window_on_read_and_write() {
    let store = catalog(5).await;
    store.insert_feedback(feedback(1, 1, 181)).await;
    store.insert_feedback(feedback(1, 2, 179)).await;
    let aggregator = PreferenceAggregator::new(Arc::new(store.clone()), config());

    let scores = aggregator.compute(1).await.unwrap();
    // work 1 sits in category 2, work 2 in category 3
    assert!(!scores.category_scores.contains_key(&2));
    let expected = 1.8 * 0.2;
    assert!((scores.category_scores[&3] - expected).abs() < 1e-9);

    let service = FeedbackService::new(Arc::new(store.clone()), config());
    service
        .record(1, 3, Some(FeedbackEventType::View), None, None)
        .await
        .unwrap();
    let remaining: HashSet<i64> = store
        .feedback_rows(1)
        .await
        .iter()
        .map(|row| row.work_id)
        .collect();
    assert_eq!(remaining, HashSet::from([2, 3]));
}

#[tokio::test]
async fn test_reader_without_signal_gets_no_affinity_section() {
    let store = catalog(40).await;
    store.add_collection(2, 5).await;
    let service = RecommendationService::new(Arc::new(store), config());

    let feed = service.build(1).await.unwrap();
    assert!(!feed.meta.is_personalized);
    assert!(feed.favorite_type_works.is_empty());
    assert!(feed.meta.top_tags.is_empty());
}

#[tokio::test]
async fn test_sections_never_share_works() {
    let store = catalog(120).await;
    store.add_collection(1, 3).await;
    store.add_vote(1, 6, 2).await;
    store.add_reading(1, 9, 1).await;
    store
        .record_search(
            1,
            SearchRecord {
                keyword: "Story 1".to_string(),
                search_time: Utc::now(),
                search_type: SearchType::Work,
            },
            100,
        )
        .await
        .unwrap();
    let service = RecommendationService::new(Arc::new(store), config());

    let feed = service.build(1).await.unwrap();
    assert!(feed.meta.is_personalized);
    assert!(feed.meta.has_search_history);
    assert!(!feed.favorite_type_works.is_empty());
    assert!(!feed.search_similar_works.is_empty());
    assert!(!feed.favorite_rank_works.is_empty());

    let ids = feed.work_ids();
    let unique: HashSet<i64> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len());
}

#[test]
fn test_mixed_delimiter_tags() {
    assert_eq!(
        parse_tags_field(Some("仙侠, 穿越；重生")),
        vec!["仙侠", "穿越", "重生"]
    );
}

#[tokio::test]
async fn test_search_history_without_matches_still_flagged() {
    let store = catalog(30).await;
    store
        .record_search(
            1,
            SearchRecord {
                keyword: "no such story anywhere".to_string(),
                search_time: Utc::now(),
                search_type: SearchType::Work,
            },
            100,
        )
        .await
        .unwrap();
    let service = RecommendationService::new(Arc::new(store), config());

    let searched = service.build(1).await.unwrap();
    assert!(searched.meta.has_search_history);
    assert_eq!(searched.search_similar_works.len(), 8);
    assert!(searched
        .search_similar_works
        .iter()
        .all(|work| !work.title.contains("no such story")));

    let fresh = service.build(2).await.unwrap();
    assert!(!fresh.meta.has_search_history);
    assert!(fresh.search_similar_works.is_empty());
}

#[tokio::test]
async fn test_equal_category_scores_order_by_id() {
    let store = catalog(8).await;
    // works 3 and 4 fall in categories 4 and 1
    store.add_collection(1, 3).await;
    store.add_collection(1, 4).await;
    let aggregator = PreferenceAggregator::new(Arc::new(store.clone()), config());

    let scores = aggregator.compute(1).await.unwrap();
    assert_eq!(scores.top_categories(3), vec![1, 4]);

    let feed = RecommendationService::new(Arc::new(store), config())
        .build(1)
        .await
        .unwrap();
    let ids: Vec<i64> = feed
        .meta
        .top_categories
        .iter()
        .map(|label| label.category_id)
        .collect();
    assert_eq!(ids, vec![1, 4]);
}
