use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    db::Store,
    error::{AppError, AppResult},
    models::{
        FeedbackSignal, FeedbackUpsert, SearchRecord, SearchType, SignalRow, SignalSource, WorkRow,
        WorkStatus,
    },
};

/// Creates a PostgreSQL connection pool
///
/// Establishes a pool of database connections for efficient reuse.
/// The pool automatically manages connection lifecycle and limits.
pub async fn create_pool(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await?;

    Ok(pool)
}

/// Projection shared by every candidate query
const WORK_COLUMNS: &str = r#"
    w.work_id, w.title, w.cover_url, w.intro, w.tags,
    w.category_id, COALESCE(c.name, '') AS category_name,
    COALESCE(w.read_count, 0)::BIGINT AS read_count,
    COALESCE(w.collect_count, 0)::BIGINT AS collect_count,
    COALESCE(w.vote_count, 0)::BIGINT AS vote_count,
    w.update_time,
    COALESCE(a.pen_name, r.nickname, u.username, '') AS author_name
"#;

const WORK_JOINS: &str = r#"
    LEFT JOIN authors a ON w.author_id = a.author_id
    LEFT JOIN readers r ON w.author_id = r.reader_id
    LEFT JOIN users u ON w.author_id = u.user_id
    LEFT JOIN categories c ON w.category_id = c.category_id
"#;

/// PostgreSQL-backed store
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded migrations for the tables this service owns
    pub async fn migrate(&self) -> AppResult<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    fn listed_codes() -> Vec<i16> {
        WorkStatus::LISTED_CODES.to_vec()
    }
}

fn to_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn signal_rows(&self, user_id: i64, source: SignalSource) -> AppResult<Vec<SignalRow>> {
        let query = match source {
            SignalSource::Collection => {
                r#"
                SELECT w.category_id, w.tags, 1::BIGINT AS count
                FROM collections c
                JOIN works w ON c.work_id = w.work_id
                WHERE c.reader_id = $1
                "#
            }
            SignalSource::Reading => {
                r#"
                SELECT w.category_id, w.tags, COUNT(DISTINCT rr.chapter_id)::BIGINT AS count
                FROM reading_records rr
                JOIN chapters ch ON rr.chapter_id = ch.chapter_id
                JOIN works w ON ch.work_id = w.work_id
                WHERE rr.reader_id = $1
                GROUP BY w.work_id, w.category_id, w.tags
                "#
            }
            SignalSource::Vote => {
                r#"
                SELECT w.category_id, w.tags, COALESCE(SUM(v.count), 0)::BIGINT AS count
                FROM votes v
                JOIN works w ON v.work_id = w.work_id
                WHERE v.reader_id = $1
                GROUP BY w.work_id, w.category_id, w.tags
                "#
            }
            SignalSource::Subscription => {
                r#"
                SELECT w.category_id, w.tags, COUNT(*)::BIGINT AS count
                FROM subscriptions s
                JOIN works w ON s.work_id = w.work_id
                WHERE s.reader_id = $1
                GROUP BY w.work_id, w.category_id, w.tags
                "#
            }
        };

        let rows = sqlx::query_as::<_, SignalRow>(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn feedback_signals(&self, user_id: i64) -> AppResult<Vec<FeedbackSignal>> {
        let rows = sqlx::query_as::<_, FeedbackSignal>(
            r#"
            SELECT w.category_id, w.tags, f.event_type, f.weight, f.event_time
            FROM user_recommendation_feedback f
            JOIN works w ON f.work_id = w.work_id
            WHERE f.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn upsert_feedback(
        &self,
        upsert: FeedbackUpsert,
        purge_before: DateTime<Utc>,
    ) -> AppResult<()> {
        let metadata = upsert
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| AppError::Internal(format!("Metadata serialization error: {}", e)))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_recommendation_feedback
                (user_id, work_id, event_type, weight, event_time, metadata)
            VALUES ($1, $2, $3, LEAST($4, $7), $5, $6)
            ON CONFLICT (user_id, work_id, event_type) DO UPDATE SET
                weight = LEAST(user_recommendation_feedback.weight + EXCLUDED.weight, $7),
                event_time = CASE WHEN $4 > 0
                    THEN GREATEST(user_recommendation_feedback.event_time, EXCLUDED.event_time)
                    ELSE user_recommendation_feedback.event_time END,
                metadata = CASE WHEN $4 > 0
                    THEN COALESCE(EXCLUDED.metadata, user_recommendation_feedback.metadata)
                    ELSE user_recommendation_feedback.metadata END
            "#,
        )
        .bind(upsert.user_id)
        .bind(upsert.work_id)
        .bind(upsert.event_type.code())
        .bind(upsert.delta)
        .bind(upsert.event_time)
        .bind(metadata)
        .bind(upsert.cap)
        .execute(&mut *tx)
        .await?;

        let purged = sqlx::query(
            "DELETE FROM user_recommendation_feedback WHERE user_id = $1 AND event_time < $2",
        )
        .bind(upsert.user_id)
        .bind(purge_before)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        if purged > 0 {
            tracing::debug!(user_id = upsert.user_id, purged, "Purged expired feedback rows");
        }

        Ok(())
    }

    async fn candidate_works(&self, category_ids: &[i64], limit: usize) -> AppResult<Vec<WorkRow>> {
        let query = format!(
            r#"
            SELECT {WORK_COLUMNS}
            FROM works w
            {WORK_JOINS}
            WHERE w.status = ANY($1)
              AND (cardinality($2::BIGINT[]) = 0 OR w.category_id = ANY($2))
            ORDER BY w.vote_count DESC NULLS LAST, w.collect_count DESC NULLS LAST,
                     w.read_count DESC NULLS LAST, w.update_time DESC NULLS LAST, w.work_id ASC
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, WorkRow>(&query)
            .bind(Self::listed_codes())
            .bind(category_ids)
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn keyword_matches(&self, keyword: &str, limit: usize) -> AppResult<Vec<WorkRow>> {
        let pattern = format!(
            "%{}%",
            keyword.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
        );
        let query = format!(
            r#"
            SELECT {WORK_COLUMNS}
            FROM works w
            {WORK_JOINS}
            WHERE w.status = ANY($1)
              AND (
                    w.title ILIKE $2 OR
                    w.intro ILIKE $2 OR
                    COALESCE(a.pen_name, r.nickname, u.username, '') ILIKE $2 OR
                    COALESCE(w.tags, '') ILIKE $2
              )
            ORDER BY w.vote_count DESC NULLS LAST, w.read_count DESC NULLS LAST,
                     w.update_time DESC NULLS LAST, w.work_id ASC
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, WorkRow>(&query)
            .bind(Self::listed_codes())
            .bind(pattern)
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn ranking_rows(&self, category_id: Option<i64>, limit: usize) -> AppResult<Vec<WorkRow>> {
        let query = format!(
            r#"
            SELECT {WORK_COLUMNS}
            FROM rankings rk
            JOIN ranking_details rd ON rk.ranking_id = rd.ranking_id
            JOIN works w ON rd.work_id = w.work_id
            {WORK_JOINS}
            WHERE w.status = ANY($1)
              AND rk.status = 1
              AND rd.stat_date = (
                  SELECT MAX(rd2.stat_date)
                  FROM ranking_details rd2
                  WHERE rd2.ranking_id = rk.ranking_id
              )
              AND rk.category_id IS NOT DISTINCT FROM $2
            ORDER BY rd.rank ASC, rd.score DESC, w.update_time DESC NULLS LAST
            LIMIT $3
            "#
        );

        let rows = sqlx::query_as::<_, WorkRow>(&query)
            .bind(Self::listed_codes())
            .bind(category_id)
            .bind(to_limit(limit))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn popular_categories(&self, limit: usize) -> AppResult<Vec<i64>> {
        let rows: Vec<(i64,)> = sqlx::query_as(
            r#"
            SELECT w.category_id
            FROM works w
            WHERE w.status = ANY($1) AND w.category_id IS NOT NULL
            GROUP BY w.category_id
            ORDER BY SUM(COALESCE(w.vote_count, 0)) * 3
                   + SUM(COALESCE(w.collect_count, 0)) * 2
                   + SUM(COALESCE(w.read_count, 0)) DESC,
                     w.category_id ASC
            LIMIT $2
            "#,
        )
        .bind(Self::listed_codes())
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn category_names(&self, category_ids: &[i64]) -> AppResult<HashMap<i64, String>> {
        if category_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows: Vec<(i64, Option<String>)> =
            sqlx::query_as("SELECT category_id, name FROM categories WHERE category_id = ANY($1)")
                .bind(category_ids)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows
            .into_iter()
            .map(|(id, name)| (id, name.unwrap_or_default()))
            .collect())
    }

    async fn recent_searches(&self, user_id: i64, limit: usize) -> AppResult<Vec<SearchRecord>> {
        let rows: Vec<(String, DateTime<Utc>, i16)> = sqlx::query_as(
            r#"
            SELECT keyword, search_time, search_type
            FROM search_records
            WHERE reader_id = $1
            ORDER BY search_time DESC, search_id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(to_limit(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(keyword, search_time, search_type)| SearchRecord {
                keyword,
                search_time,
                search_type: SearchType::from_code(search_type),
            })
            .collect())
    }

    async fn record_search(&self, user_id: i64, record: SearchRecord, keep: usize) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_records WHERE reader_id = $1 AND keyword = $2")
            .bind(user_id)
            .bind(&record.keyword)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO search_records (reader_id, keyword, search_type, search_time)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(user_id)
        .bind(&record.keyword)
        .bind(record.search_type.code())
        .bind(record.search_time)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            DELETE FROM search_records
            WHERE reader_id = $1 AND search_id NOT IN (
                SELECT search_id
                FROM search_records
                WHERE reader_id = $1
                ORDER BY search_time DESC, search_id DESC
                LIMIT $2
            )
            "#,
        )
        .bind(user_id)
        .bind(to_limit(keep))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "postgres"
    }
}
