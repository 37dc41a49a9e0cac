//! Ranking rules shared by every [`SimilaritySearch`](crate::SimilaritySearch)
//! implementation.

use std::cmp::Ordering;

use crate::models::SimilarityMatch;

/// Cosine similarity of two vectors.
///
/// Mismatched dimensions or a zero vector score 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Drop matches below `threshold` (and NaN scores), sort by descending
/// similarity and keep at most `top_k`.
///
/// Ties break on document ID then chunk index so results are stable.
pub fn rank_matches(
    mut matches: Vec<SimilarityMatch>,
    threshold: f32,
    top_k: usize,
) -> Vec<SimilarityMatch> {
    matches.retain(|m| m.similarity >= threshold);
    matches.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_index.cmp(&b.chunk_index))
    });
    matches.truncate(top_k);
    matches
}
