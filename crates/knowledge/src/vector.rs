//! Vector similarity utilities.

use wayfinder_core::knowledge::{IndexedRecord, ScoredRecord};

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the vectors differ in length or either is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank records by cosine similarity to a query embedding, best first.
///
/// Ties keep insertion order so results are deterministic.
pub fn nearest<'a>(
    records: impl IntoIterator<Item = &'a IndexedRecord>,
    query_embedding: &[f32],
    k: usize,
) -> Vec<ScoredRecord> {
    let mut scored: Vec<ScoredRecord> = records
        .into_iter()
        .map(|record| ScoredRecord {
            score: cosine_similarity(&record.embedding, query_embedding),
            record: record.clone(),
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(k);
    scored
}
