//! Batched candidate scoring
//!
//! Groups queries into fixed-size batches, gathers their descriptors and the
//! descriptors of every shortlisted candidate into one flattened
//! [`ScoreBatch`], and hands it to the backend in a single call. Slot `i` of
//! a batch always corresponds to `query_indices[i]` and score `j` within a
//! slot to column `j` of that query's cache row; the unflattening step
//! re-checks both the slot set and the per-slot score counts so a backend
//! cannot silently permute or drop candidates.

use crate::candidates::CandidateCache;
use crate::features::FeatureSet;
use crate::RerankError;
use rerank_eval_backend::{Backend, BackendError, ScoreBatch, ScoreReceiver, Scores};
use thiserror::Error;
use tracing::instrument;

/// One scored shortlist entry
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredCandidate {
    pub index: u32,
    pub score: f32,
}

pub struct BatchScorer<'a> {
    backend: Backend,
    queries: &'a FeatureSet,
    gallery: &'a FeatureSet,
    cache: &'a CandidateCache,
    batch_size: usize,
}

impl<'a> BatchScorer<'a> {
    pub fn new(
        backend: Backend,
        queries: &'a FeatureSet,
        gallery: &'a FeatureSet,
        cache: &'a CandidateCache,
        batch_size: usize,
    ) -> Result<Self, ScoringError> {
        if batch_size == 0 {
            return Err(ScoringError::Validation(
                "`batch_size` must be at least 1".to_string(),
            ));
        }
        if !queries.is_empty() && !gallery.is_empty() && queries.dim() != gallery.dim() {
            return Err(ScoringError::Validation(format!(
                "Query descriptors have dimension {} but gallery descriptors have {}",
                queries.dim(),
                gallery.dim()
            )));
        }
        if cache.num_queries() < queries.len() {
            return Err(ScoringError::Validation(format!(
                "Candidate cache holds {} rows but {} queries were supplied",
                cache.num_queries(),
                queries.len()
            )));
        }

        let batch_size = match backend.max_batch_size {
            Some(max) if batch_size > max => {
                tracing::warn!("`batch_size` clamped to the backend maximum of {max}");
                max
            }
            _ => batch_size,
        };

        Ok(Self {
            backend,
            queries,
            gallery,
            cache,
            batch_size,
        })
    }

    /// Score every query's shortlist, `limit`-truncated if requested.
    ///
    /// Batches are queued into the replica pool ahead of collection so that
    /// all replicas stay busy; responses are collected in submission order,
    /// which keeps the output independent of replica scheduling.
    #[instrument(skip_all)]
    pub async fn score_all(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<Vec<ScoredCandidate>>, RerankError> {
        let total = limit.unwrap_or(self.queries.len()).min(self.queries.len());
        let indices: Vec<usize> = (0..total).collect();

        let mut pending: Vec<(&[usize], ScoreReceiver)> =
            Vec::with_capacity(total.div_ceil(self.batch_size));
        for chunk in indices.chunks(self.batch_size) {
            let batch = self.build_batch(chunk)?;
            let histogram = metrics::histogram!("re_score_batch_size");
            histogram.record(chunk.len() as f64);
            pending.push((chunk, self.backend.submit(batch).await));
        }

        let mut scored = Vec::with_capacity(total);
        for (chunk, receiver) in pending {
            let (scores, inference_duration) = receiver
                .await
                .expect("Backend dropped the sender without sending a response. This is a bug.")
                .map_err(|err| {
                    let counter = metrics::counter!("re_score_failure", "err" => "backend");
                    counter.increment(1);
                    tracing::error!("{err}");
                    ScoringError::from(err)
                })?;

            let histogram = metrics::histogram!("re_score_inference_duration");
            histogram.record(inference_duration.as_secs_f64());

            scored.append(&mut self.unflatten(chunk, scores)?);
        }

        let counter = metrics::counter!("re_score_count");
        counter.increment(total as u64);

        Ok(scored)
    }

    /// Score one batch of queries synchronously
    #[instrument(skip_all)]
    pub async fn score_batch(
        &self,
        query_indices: &[usize],
    ) -> Result<Vec<Vec<ScoredCandidate>>, RerankError> {
        let batch = self.build_batch(query_indices)?;
        let (scores, _) = self.backend.score(batch).await.map_err(|err| {
            let counter = metrics::counter!("re_score_failure", "err" => "backend");
            counter.increment(1);
            tracing::error!("{err}");
            ScoringError::from(err)
        })?;
        self.unflatten(query_indices, scores)
    }

    fn build_batch(&self, query_indices: &[usize]) -> Result<ScoreBatch, RerankError> {
        let dim = self.queries.dim();
        let width = self.cache.width();

        let mut query_features = Vec::with_capacity(query_indices.len() * dim);
        let mut candidate_features = Vec::with_capacity(query_indices.len() * width * dim);
        let mut cumulative_candidates = Vec::with_capacity(query_indices.len() + 1);
        cumulative_candidates.push(0u32);

        for &query in query_indices {
            let row = self.cache.candidates_for(query)?;
            query_features.extend_from_slice(self.queries.row(query));
            for &candidate in row {
                candidate_features.extend_from_slice(self.gallery.row(candidate as usize));
            }
            let last = *cumulative_candidates
                .last()
                .expect("cumulative offsets always hold a leading 0. This is a bug.");
            cumulative_candidates.push(last + row.len() as u32);
        }

        Ok(ScoreBatch {
            query_features,
            candidate_features,
            cumulative_candidates,
            dim,
        })
    }

    fn unflatten(
        &self,
        query_indices: &[usize],
        mut scores: Scores,
    ) -> Result<Vec<Vec<ScoredCandidate>>, RerankError> {
        let mut out = Vec::with_capacity(query_indices.len());
        for (slot, &query) in query_indices.iter().enumerate() {
            let row = self.cache.candidates_for(query)?;
            let slot_scores = scores.remove(&slot).ok_or_else(|| {
                let counter = metrics::counter!("re_score_failure", "err" => "missing_slot");
                counter.increment(1);
                ScoringError::MissingSlot { slot, query }
            })?;
            if slot_scores.len() != row.len() {
                let counter = metrics::counter!("re_score_failure", "err" => "count_mismatch");
                counter.increment(1);
                return Err(ScoringError::CountMismatch {
                    query,
                    expected: row.len(),
                    got: slot_scores.len(),
                }
                .into());
            }
            let mut entries = Vec::with_capacity(row.len());
            for (&index, &score) in row.iter().zip(slot_scores.iter()) {
                if !score.is_finite() {
                    let counter = metrics::counter!("re_score_failure", "err" => "non_finite");
                    counter.increment(1);
                    return Err(ScoringError::NonFiniteScore {
                        query,
                        candidate: index,
                        score,
                    }
                    .into());
                }
                entries.push(ScoredCandidate { index, score });
            }
            out.push(entries);
        }
        Ok(out)
    }
}

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Input validation error: {0}")]
    Validation(String),
    #[error("Backend returned no scores for batch slot {slot} (query {query})")]
    MissingSlot { slot: usize, query: usize },
    #[error("Score count mismatch for query {query}: expected {expected}, got {got}")]
    CountMismatch {
        query: usize,
        expected: usize,
        got: usize,
    },
    #[error("Non-finite score {score} for query {query}, candidate {candidate}")]
    NonFiniteScore {
        query: usize,
        candidate: u32,
        score: f32,
    },
}
