//! Similarity search over stored face embeddings.

use crate::types::{Embedding, FaceRecord, SimilarityResult};
use std::borrow::Borrow;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("embedding dimension mismatch for {id}: query has {expected}, candidate has {actual}")]
    DimensionMismatch {
        id: String,
        expected: usize,
        actual: usize,
    },
    #[error("threshold must be within [0, 1], got {0}")]
    InvalidThreshold(f32),
    #[error("result limit must be at least 1, got {0}")]
    InvalidLimit(usize),
}

/// Strategy for ranking a gallery of stored faces against a query embedding.
pub trait Matcher {
    /// Score every candidate, keep those at or above `threshold`, and return
    /// at most `limit` results, best first, ties broken by id ascending.
    ///
    /// `candidates` is traversed once and never reordered. Any candidate
    /// whose dimensionality differs from the query fails the whole call.
    fn search<I, R>(
        &self,
        query: &Embedding,
        candidates: I,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, MatchError>
    where
        I: IntoIterator<Item = R>,
        R: Borrow<FaceRecord>;
}

/// Cosine similarity matcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn search<I, R>(
        &self,
        query: &Embedding,
        candidates: I,
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<SimilarityResult>, MatchError>
    where
        I: IntoIterator<Item = R>,
        R: Borrow<FaceRecord>,
    {
        validate(threshold, limit)?;

        let expected = query.dim();
        let mut hits = Vec::new();

        for candidate in candidates {
            let record = candidate.borrow();
            let actual = record.embedding.dim();
            if actual != expected {
                return Err(MatchError::DimensionMismatch {
                    id: record.id.clone(),
                    expected,
                    actual,
                });
            }

            let score = query.similarity(&record.embedding);
            // NaN never passes.
            if score >= threshold {
                hits.push(SimilarityResult {
                    id: record.id.clone(),
                    score,
                    source: record.source.clone(),
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);

        tracing::debug!(
            dim = expected,
            threshold,
            limit,
            returned = hits.len(),
            "similarity search complete"
        );

        Ok(hits)
    }
}

/// Check search parameters: `threshold` within [0, 1], `limit` at least 1.
pub fn validate(threshold: f32, limit: usize) -> Result<(), MatchError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(MatchError::InvalidThreshold(threshold));
    }
    if limit < 1 {
        return Err(MatchError::InvalidLimit(limit));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(id: &str, values: Vec<f32>) -> FaceRecord {
        FaceRecord {
            id: id.into(),
            directory: "dir".into(),
            filename: format!("{id}.jpg"),
            source: format!("http://objects/{id}"),
            embedding: Embedding::new(values),
            created_at: Utc::now(),
        }
    }

    fn query(values: Vec<f32>) -> Embedding {
        Embedding::new(values)
    }

    #[test]
    fn test_reference_scenario() {
        let gallery = vec![
            record("A", vec![1.0, 0.0]),
            record("B", vec![0.0, 1.0]),
            record("C", vec![0.9, 0.1]),
        ];

        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.5, 2)
            .unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "A");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results[1].id, "C");
        assert!((results[1].score - 0.994).abs() < 1e-3, "got {}", results[1].score);
        assert_eq!(results[1].source, "http://objects/C");
    }

    #[test]
    fn test_empty_candidates() {
        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), Vec::<FaceRecord>::new(), 0.5, 3)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let gallery = vec![record("A", vec![1.0, 0.0])];
        let err = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.5, 0)
            .unwrap_err();
        assert_eq!(err, MatchError::InvalidLimit(0));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let gallery = vec![record("A", vec![1.0, 0.0])];
        for t in [-0.1, 1.5, f32::NAN] {
            let err = CosineMatcher
                .search(&query(vec![1.0, 0.0]), &gallery, t, 1)
                .unwrap_err();
            assert!(matches!(err, MatchError::InvalidThreshold(_)), "threshold {t}");
        }
    }

    #[test]
    fn test_threshold_bounds_accepted() {
        let gallery = vec![record("A", vec![1.0, 0.0])];
        let q = query(vec![1.0, 0.0]);
        assert_eq!(CosineMatcher.search(&q, &gallery, 0.0, 1).unwrap().len(), 1);
        assert_eq!(CosineMatcher.search(&q, &gallery, 1.0, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_dimension_mismatch_returns_no_partial_results() {
        let gallery = vec![
            record("A", vec![1.0, 0.0]),
            record("B", vec![1.0, 0.0, 0.0]),
            record("C", vec![1.0, 0.0]),
        ];
        let err = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.0, 5)
            .unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                id: "B".into(),
                expected: 2,
                actual: 3,
            }
        );
    }

    #[test]
    fn test_ties_broken_by_id() {
        let gallery = vec![
            record("zeta", vec![1.0, 0.0]),
            record("alpha", vec![2.0, 0.0]),
            record("mid", vec![3.0, 0.0]),
        ];
        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.5, 10)
            .unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_results_sorted_and_above_threshold() {
        let gallery: Vec<_> = (0..20)
            .map(|i| {
                let angle = i as f32 * 0.15;
                record(&format!("f{i:02}"), vec![angle.cos(), angle.sin()])
            })
            .collect();
        let threshold = 0.3;
        let limit = 7;

        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, threshold, limit)
            .unwrap();

        assert!(results.len() <= limit);
        assert!(results.iter().all(|r| r.score >= threshold));
        for pair in results.windows(2) {
            assert!(
                pair[0].score > pair[1].score
                    || (pair[0].score == pair[1].score && pair[0].id < pair[1].id)
            );
        }
    }

    #[test]
    fn test_limit_larger_than_gallery() {
        let gallery = vec![record("A", vec![1.0, 0.0]), record("B", vec![0.8, 0.2])];
        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.0, 50)
            .unwrap();
        assert_eq!(results.len(), gallery.len());
    }

    #[test]
    fn test_idempotent() {
        let gallery = vec![
            record("A", vec![0.3, 0.7]),
            record("B", vec![0.7, 0.3]),
            record("C", vec![0.5, 0.5]),
        ];
        let q = query(vec![0.6, 0.4]);
        let first = CosineMatcher.search(&q, &gallery, 0.1, 3).unwrap();
        let second = CosineMatcher.search(&q, &gallery, 0.1, 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_accepts_streamed_candidates() {
        let stream = (0..3).map(|i| record(&format!("s{i}"), vec![1.0, i as f32]));
        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), stream, 0.0, 1)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "s0");
    }

    #[test]
    fn test_negative_similarity_excluded_at_zero_threshold() {
        let gallery = vec![record("opposite", vec![-1.0, 0.0])];
        let results = CosineMatcher
            .search(&query(vec![1.0, 0.0]), &gallery, 0.0, 1)
            .unwrap();
        assert!(results.is_empty());
    }
}
