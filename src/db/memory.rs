use std::{
    cmp::Reverse,
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::Arc,
};

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::{
    db::Store,
    error::AppResult,
    models::{
        FeedbackEventType, FeedbackRecord, FeedbackSignal, FeedbackUpsert, SearchRecord, SignalRow,
        SignalSource, WorkRow, WorkStatus,
    },
};

/// A work as held by the in-memory catalog
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRecord {
    pub work_id: i64,
    pub title: String,
    pub cover_url: Option<String>,
    pub intro: Option<String>,
    pub tags: Option<String>,
    pub category_id: Option<i64>,
    pub author_name: String,
    pub status: WorkStatus,
    pub read_count: i64,
    pub collect_count: i64,
    pub vote_count: i64,
    pub update_time: Option<DateTime<Utc>>,
}

impl WorkRecord {
    /// Creates a serializing work with zeroed counters
    pub fn new(work_id: i64, title: impl Into<String>, category_id: Option<i64>) -> Self {
        Self {
            work_id,
            title: title.into(),
            cover_url: None,
            intro: None,
            tags: None,
            category_id,
            author_name: String::new(),
            status: WorkStatus::Serializing,
            read_count: 0,
            collect_count: 0,
            vote_count: 0,
            update_time: None,
        }
    }

    pub fn tags(mut self, tags: impl Into<String>) -> Self {
        self.tags = Some(tags.into());
        self
    }

    pub fn intro(mut self, intro: impl Into<String>) -> Self {
        self.intro = Some(intro.into());
        self
    }

    pub fn author(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = author_name.into();
        self
    }

    pub fn status(mut self, status: WorkStatus) -> Self {
        self.status = status;
        self
    }

    pub fn counts(mut self, reads: i64, collects: i64, votes: i64) -> Self {
        self.read_count = reads;
        self.collect_count = collects;
        self.vote_count = votes;
        self
    }

    pub fn updated_at(mut self, update_time: DateTime<Utc>) -> Self {
        self.update_time = Some(update_time);
        self
    }

    fn popularity(&self) -> i64 {
        self.vote_count * 3 + self.collect_count * 2 + self.read_count
    }

    fn matches(&self, needle: &str) -> bool {
        [
            Some(self.title.as_str()),
            self.intro.as_deref(),
            Some(self.author_name.as_str()),
            self.tags.as_deref(),
        ]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
    }
}

/// One row of a ranking snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RankingEntry {
    pub ranking_id: i64,
    /// `None` for the general boards
    pub category_id: Option<i64>,
    pub work_id: i64,
    pub rank: i32,
    pub score: f64,
    pub stat_date: NaiveDate,
    pub active: bool,
}

#[derive(Default)]
struct Tables {
    works: BTreeMap<i64, WorkRecord>,
    categories: HashMap<i64, String>,
    collections: Vec<(i64, i64)>,
    reading_records: Vec<(i64, i64, i64)>,
    votes: Vec<(i64, i64, i64)>,
    subscriptions: Vec<(i64, i64)>,
    rankings: Vec<RankingEntry>,
    feedback: BTreeMap<(i64, i64, FeedbackEventType), FeedbackRecord>,
    searches: Vec<(i64, SearchRecord)>,
}

impl Tables {
    fn row(&self, work: &WorkRecord) -> WorkRow {
        WorkRow {
            work_id: work.work_id,
            title: work.title.clone(),
            cover_url: work.cover_url.clone(),
            intro: work.intro.clone(),
            tags: work.tags.clone(),
            category_id: work.category_id,
            category_name: work
                .category_id
                .and_then(|id| self.categories.get(&id))
                .cloned()
                .unwrap_or_default(),
            read_count: work.read_count,
            collect_count: work.collect_count,
            vote_count: work.vote_count,
            update_time: work.update_time,
            author_name: work.author_name.clone(),
        }
    }

    fn listed(&self) -> impl Iterator<Item = &WorkRecord> {
        self.works.values().filter(|work| work.status.is_listed())
    }

    /// Groups per-work counts into signal rows, in work id order
    fn grouped(&self, counts: BTreeMap<i64, i64>) -> Vec<SignalRow> {
        counts
            .into_iter()
            .filter_map(|(work_id, count)| {
                self.works.get(&work_id).map(|work| SignalRow {
                    category_id: work.category_id,
                    tags: work.tags.clone(),
                    count,
                })
            })
            .collect()
    }
}

/// In-memory store with the same semantics as the PostgreSQL backend
///
/// Every write takes the table lock, so a feedback upsert and its retention
/// purge are observed as one unit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_category(&self, category_id: i64, name: impl Into<String>) {
        self.tables.write().await.categories.insert(category_id, name.into());
    }

    pub async fn add_work(&self, work: WorkRecord) {
        self.tables.write().await.works.insert(work.work_id, work);
    }

    pub async fn add_collection(&self, user_id: i64, work_id: i64) {
        self.tables.write().await.collections.push((user_id, work_id));
    }

    pub async fn add_reading(&self, user_id: i64, work_id: i64, chapter_id: i64) {
        self.tables
            .write()
            .await
            .reading_records
            .push((user_id, work_id, chapter_id));
    }

    pub async fn add_vote(&self, user_id: i64, work_id: i64, count: i64) {
        self.tables.write().await.votes.push((user_id, work_id, count));
    }

    pub async fn add_subscription(&self, user_id: i64, work_id: i64) {
        self.tables.write().await.subscriptions.push((user_id, work_id));
    }

    pub async fn add_ranking_entry(&self, entry: RankingEntry) {
        self.tables.write().await.rankings.push(entry);
    }

    /// Stores a feedback row verbatim, bypassing merge and retention
    pub async fn insert_feedback(&self, record: FeedbackRecord) {
        let key = (record.user_id, record.work_id, record.event_type);
        self.tables.write().await.feedback.insert(key, record);
    }

    /// A user's stored feedback rows
    pub async fn feedback_rows(&self, user_id: i64) -> Vec<FeedbackRecord> {
        self.tables
            .read()
            .await
            .feedback
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[async_trait::async_trait]
impl Store for MemoryStore {
    async fn signal_rows(&self, user_id: i64, source: SignalSource) -> AppResult<Vec<SignalRow>> {
        let tables = self.tables.read().await;

        let rows: Vec<SignalRow> = match source {
            SignalSource::Collection => tables
                .collections
                .iter()
                .filter(|(reader, _)| *reader == user_id)
                .filter_map(|(_, work_id)| tables.works.get(work_id))
                .map(|work| SignalRow {
                    category_id: work.category_id,
                    tags: work.tags.clone(),
                    count: 1,
                })
                .collect(),
            SignalSource::Reading => {
                let mut chapters: BTreeMap<i64, BTreeSet<i64>> = BTreeMap::new();
                for (_, work_id, chapter_id) in tables
                    .reading_records
                    .iter()
                    .filter(|(reader, _, _)| *reader == user_id)
                {
                    chapters.entry(*work_id).or_default().insert(*chapter_id);
                }
                let counts = chapters
                    .into_iter()
                    .map(|(work_id, set)| (work_id, set.len() as i64))
                    .collect();
                tables.grouped(counts)
            }
            SignalSource::Vote => {
                let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
                for (_, work_id, count) in tables.votes.iter().filter(|(reader, _, _)| *reader == user_id) {
                    *counts.entry(*work_id).or_default() += count;
                }
                tables.grouped(counts)
            }
            SignalSource::Subscription => {
                let mut counts: BTreeMap<i64, i64> = BTreeMap::new();
                for (_, work_id) in tables.subscriptions.iter().filter(|(reader, _)| *reader == user_id) {
                    *counts.entry(*work_id).or_default() += 1;
                }
                tables.grouped(counts)
            }
        };

        Ok(rows)
    }

    async fn feedback_signals(&self, user_id: i64) -> AppResult<Vec<FeedbackSignal>> {
        let tables = self.tables.read().await;
        Ok(tables
            .feedback
            .values()
            .filter(|record| record.user_id == user_id)
            .filter_map(|record| {
                tables.works.get(&record.work_id).map(|work| FeedbackSignal {
                    category_id: work.category_id,
                    tags: work.tags.clone(),
                    event_type: record.event_type.code(),
                    weight: record.weight,
                    event_time: record.event_time,
                })
            })
            .collect())
    }

    async fn upsert_feedback(
        &self,
        upsert: FeedbackUpsert,
        purge_before: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        let key = (upsert.user_id, upsert.work_id, upsert.event_type);
        tables
            .feedback
            .entry(key)
            .and_modify(|record| record.merge(&upsert))
            .or_insert_with(|| FeedbackRecord::from(&upsert));

        tables
            .feedback
            .retain(|_, record| record.user_id != upsert.user_id || record.event_time >= purge_before);

        Ok(())
    }

    async fn candidate_works(&self, category_ids: &[i64], limit: usize) -> AppResult<Vec<WorkRow>> {
        let tables = self.tables.read().await;

        let mut works: Vec<&WorkRecord> = tables
            .listed()
            .filter(|work| {
                category_ids.is_empty()
                    || work.category_id.is_some_and(|id| category_ids.contains(&id))
            })
            .collect();
        works.sort_by_key(|work| {
            (
                Reverse(work.vote_count),
                Reverse(work.collect_count),
                Reverse(work.read_count),
                Reverse(work.update_time),
                work.work_id,
            )
        });

        Ok(works.into_iter().take(limit).map(|work| tables.row(work)).collect())
    }

    async fn keyword_matches(&self, keyword: &str, limit: usize) -> AppResult<Vec<WorkRow>> {
        let tables = self.tables.read().await;
        let needle = keyword.to_lowercase();

        let mut works: Vec<&WorkRecord> = tables.listed().filter(|work| work.matches(&needle)).collect();
        works.sort_by_key(|work| {
            (
                Reverse(work.vote_count),
                Reverse(work.read_count),
                Reverse(work.update_time),
                work.work_id,
            )
        });

        Ok(works.into_iter().take(limit).map(|work| tables.row(work)).collect())
    }

    async fn ranking_rows(&self, category_id: Option<i64>, limit: usize) -> AppResult<Vec<WorkRow>> {
        let tables = self.tables.read().await;

        let mut latest: HashMap<i64, NaiveDate> = HashMap::new();
        for entry in &tables.rankings {
            let date = latest.entry(entry.ranking_id).or_insert(entry.stat_date);
            if entry.stat_date > *date {
                *date = entry.stat_date;
            }
        }

        let mut entries: Vec<(&RankingEntry, &WorkRecord)> = tables
            .rankings
            .iter()
            .filter(|entry| entry.active && entry.category_id == category_id)
            .filter(|entry| latest.get(&entry.ranking_id) == Some(&entry.stat_date))
            .filter_map(|entry| {
                tables
                    .works
                    .get(&entry.work_id)
                    .filter(|work| work.status.is_listed())
                    .map(|work| (entry, work))
            })
            .collect();
        entries.sort_by(|(a, work_a), (b, work_b)| {
            a.rank
                .cmp(&b.rank)
                .then(b.score.total_cmp(&a.score))
                .then(work_b.update_time.cmp(&work_a.update_time))
        });

        Ok(entries
            .into_iter()
            .take(limit)
            .map(|(_, work)| tables.row(work))
            .collect())
    }

    async fn popular_categories(&self, limit: usize) -> AppResult<Vec<i64>> {
        let tables = self.tables.read().await;

        let mut popularity: BTreeMap<i64, i64> = BTreeMap::new();
        for work in tables.listed() {
            if let Some(category_id) = work.category_id {
                *popularity.entry(category_id).or_default() += work.popularity();
            }
        }

        let mut ranked: Vec<(i64, i64)> = popularity.into_iter().collect();
        ranked.sort_by_key(|(category_id, score)| (Reverse(*score), *category_id));

        Ok(ranked.into_iter().take(limit).map(|(id, _)| id).collect())
    }

    async fn category_names(&self, category_ids: &[i64]) -> AppResult<HashMap<i64, String>> {
        let tables = self.tables.read().await;
        Ok(category_ids
            .iter()
            .filter_map(|id| tables.categories.get(id).map(|name| (*id, name.clone())))
            .collect())
    }

    async fn recent_searches(&self, user_id: i64, limit: usize) -> AppResult<Vec<SearchRecord>> {
        let tables = self.tables.read().await;

        // Later insertions win ties on search_time
        let mut records: Vec<(usize, &SearchRecord)> = tables
            .searches
            .iter()
            .enumerate()
            .filter(|(_, (reader, _))| *reader == user_id)
            .map(|(index, (_, record))| (index, record))
            .collect();
        records.sort_by_key(|(index, record)| Reverse((record.search_time, *index)));

        Ok(records
            .into_iter()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn record_search(&self, user_id: i64, record: SearchRecord, keep: usize) -> AppResult<()> {
        let mut tables = self.tables.write().await;

        tables
            .searches
            .retain(|(reader, existing)| *reader != user_id || existing.keyword != record.keyword);
        tables.searches.push((user_id, record));

        let mut own: Vec<(usize, DateTime<Utc>)> = tables
            .searches
            .iter()
            .enumerate()
            .filter(|(_, (reader, _))| *reader == user_id)
            .map(|(index, (_, existing))| (index, existing.search_time))
            .collect();
        if own.len() > keep {
            own.sort_by_key(|(index, time)| Reverse((*time, *index)));
            let dropped: BTreeSet<usize> = own.into_iter().skip(keep).map(|(index, _)| index).collect();
            let mut index = 0;
            tables.searches.retain(|_| {
                let keep_entry = !dropped.contains(&index);
                index += 1;
                keep_entry
            });
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SearchType;
    use chrono::Duration;

    fn search(keyword: &str, at: DateTime<Utc>) -> SearchRecord {
        SearchRecord {
            keyword: keyword.to_string(),
            search_time: at,
            search_type: SearchType::Work,
        }
    }

    #[tokio::test]
    async fn test_candidates_exclude_unlisted_and_order_by_popularity() {
        let store = MemoryStore::new();
        store.add_work(WorkRecord::new(1, "a", Some(1)).counts(0, 0, 5)).await;
        store.add_work(WorkRecord::new(2, "b", Some(1)).counts(0, 0, 9)).await;
        store
            .add_work(WorkRecord::new(3, "c", Some(1)).counts(0, 0, 99).status(WorkStatus::Draft))
            .await;
        store.add_work(WorkRecord::new(4, "d", Some(2)).counts(0, 0, 50)).await;

        let rows = store.candidate_works(&[1], 10).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|row| row.work_id).collect();
        assert_eq!(ids, vec![2, 1]);

        let all = store.candidate_works(&[], 2).await.unwrap();
        let ids: Vec<i64> = all.iter().map(|row| row.work_id).collect();
        assert_eq!(ids, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_keyword_matches_title_intro_author_and_tags() {
        let store = MemoryStore::new();
        let works = [
            WorkRecord::new(1, "Ember Road", Some(1)).counts(0, 0, 10),
            WorkRecord::new(2, "Night", Some(1))
                .intro("an ember in the dark")
                .counts(0, 0, 20),
            WorkRecord::new(3, "Ashes", Some(1)).author("Ember Li").counts(0, 0, 30),
            WorkRecord::new(4, "Cinders", Some(1)).tags("ember, 仙侠").counts(0, 0, 40),
            WorkRecord::new(5, "Frost", Some(1))
                .intro("cold")
                .author("Snow")
                .counts(0, 0, 99),
        ];
        for work in works {
            store.add_work(work).await;
        }

        let rows = store.keyword_matches("EMBER", 10).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|row| row.work_id).collect();
        assert_eq!(ids, vec![4, 3, 2, 1]);
        assert_eq!(rows[1].author_name, "Ember Li");
        assert_eq!(rows[2].intro.as_deref(), Some("an ember in the dark"));
    }

    #[tokio::test]
    async fn test_reading_signal_counts_distinct_chapters() {
        let store = MemoryStore::new();
        store.add_work(WorkRecord::new(1, "a", Some(1))).await;
        store.add_reading(7, 1, 10).await;
        store.add_reading(7, 1, 10).await;
        store.add_reading(7, 1, 11).await;
        store.add_reading(8, 1, 12).await;

        let rows = store.signal_rows(7, SignalSource::Reading).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
    }

    #[tokio::test]
    async fn test_ranking_rows_use_latest_snapshot() {
        let store = MemoryStore::new();
        for id in 1..=3 {
            store.add_work(WorkRecord::new(id, "w", Some(5))).await;
        }
        let old = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let new = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        for (work_id, rank, date) in [(1, 1, old), (2, 2, new), (3, 1, new)] {
            store
                .add_ranking_entry(RankingEntry {
                    ranking_id: 1,
                    category_id: Some(5),
                    work_id,
                    rank,
                    score: 0.0,
                    stat_date: date,
                    active: true,
                })
                .await;
        }

        let rows = store.ranking_rows(Some(5), 10).await.unwrap();
        let ids: Vec<i64> = rows.iter().map(|row| row.work_id).collect();
        assert_eq!(ids, vec![3, 2]);
        assert!(store.ranking_rows(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_search_replaces_and_trims() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.record_search(1, search("a", now - Duration::minutes(3)), 2).await.unwrap();
        store.record_search(1, search("b", now - Duration::minutes(2)), 2).await.unwrap();
        store.record_search(1, search("a", now - Duration::minutes(1)), 2).await.unwrap();
        store.record_search(1, search("c", now), 2).await.unwrap();

        let keywords: Vec<String> = store
            .recent_searches(1, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.keyword)
            .collect();
        assert_eq!(keywords, vec!["c", "a"]);
    }

    #[tokio::test]
    async fn test_popular_categories_weighting() {
        let store = MemoryStore::new();
        store.add_work(WorkRecord::new(1, "a", Some(1)).counts(100, 0, 0)).await;
        store.add_work(WorkRecord::new(2, "b", Some(2)).counts(0, 0, 40)).await;
        store.add_work(WorkRecord::new(3, "c", Some(3)).counts(0, 60, 0)).await;
        store.add_work(WorkRecord::new(4, "d", None).counts(0, 0, 1000)).await;

        let ids = store.popular_categories(3).await.unwrap();
        assert_eq!(ids, vec![2, 3, 1]);
    }
}
