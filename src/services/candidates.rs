//! Candidate materialization shared by every recommendation strategy.

use std::collections::HashSet;

use crate::{
    db::Store,
    error::AppResult,
    models::{WorkCandidate, WorkRow},
};

/// Maps storage rows to candidates, dropping excluded and repeated works
///
/// Input order is preserved and at most `limit` candidates are returned.
pub fn materialize<I>(rows: I, exclude: &HashSet<i64>, limit: usize) -> Vec<WorkCandidate>
where
    I: IntoIterator<Item = WorkRow>,
{
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();
    for row in rows {
        if candidates.len() >= limit {
            break;
        }
        if exclude.contains(&row.work_id) || !seen.insert(row.work_id) {
            continue;
        }
        candidates.push(WorkCandidate::from(row));
    }
    candidates
}

/// Popular listed works, optionally restricted to categories
///
/// Over-fetches by the size of `exclude` so exclusions never starve the result.
pub async fn fetch_candidates(
    store: &dyn Store,
    category_ids: &[i64],
    limit: usize,
    exclude: &HashSet<i64>,
) -> AppResult<Vec<WorkCandidate>> {
    let rows = store
        .candidate_works(category_ids, limit.max(exclude.len() + limit))
        .await?;
    Ok(materialize(rows, exclude, limit))
}

/// Sorts scored candidates by descending score and keeps the first `limit` unique works
///
/// Equal scores keep their incoming order.
pub fn rank_by_score(mut scored: Vec<(f64, WorkCandidate)>, limit: usize) -> Vec<WorkCandidate> {
    scored.sort_by(|(a, _), (b, _)| b.total_cmp(a));
    let mut seen = HashSet::new();
    scored
        .into_iter()
        .map(|(_, work)| work)
        .filter(|work| seen.insert(work.work_id))
        .take(limit)
        .collect()
}

/// Ids of the given candidates
pub fn work_ids(works: &[WorkCandidate]) -> HashSet<i64> {
    works.iter().map(|work| work.work_id).collect()
}
