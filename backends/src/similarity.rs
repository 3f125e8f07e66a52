//! Descriptor-similarity scoring backend
//!
//! Scores every candidate by cosine similarity between its descriptor and the
//! query descriptor. This is the same signal the coarse nearest-neighbor
//! shortlist was built from; it stands in wherever a learned reranker is not
//! available and doubles as a deterministic backend for tests.

use nohash_hasher::IntMap;

use crate::math::cosine_similarity;
use rerank_eval_backend_core::{Backend, BackendError, ScoreBatch, Scores};

#[derive(Debug, Default)]
pub struct SimilarityBackend;

impl SimilarityBackend {
    pub fn new() -> Self {
        Self
    }

    fn validate(batch: &ScoreBatch) -> Result<(), BackendError> {
        if batch.dim == 0 {
            return Err(BackendError::Inference(
                "Descriptor dimension cannot be 0".to_string(),
            ));
        }
        if batch.query_features.len() != batch.len() * batch.dim {
            return Err(BackendError::Inference(format!(
                "Query feature shape mismatch: {} values for {} rows of dim {}",
                batch.query_features.len(),
                batch.len(),
                batch.dim
            )));
        }
        let total_candidates = *batch
            .cumulative_candidates
            .last()
            .expect("cumulative offsets always hold a leading 0. This is a bug.")
            as usize;
        if batch.candidate_features.len() != total_candidates * batch.dim {
            return Err(BackendError::Inference(format!(
                "Candidate feature shape mismatch: {} values for {} rows of dim {}",
                batch.candidate_features.len(),
                total_candidates,
                batch.dim
            )));
        }
        Ok(())
    }
}

impl Backend for SimilarityBackend {
    fn health(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn score(&self, batch: ScoreBatch) -> Result<Scores, BackendError> {
        Self::validate(&batch)?;

        let mut scores: Scores = IntMap::default();
        for slot in 0..batch.len() {
            let query = batch.query_row(slot);
            let mut slot_scores = Vec::with_capacity(batch.candidate_count(slot));
            for j in 0..batch.candidate_count(slot) {
                let candidate = batch.candidate_row(slot, j);
                let similarity = cosine_similarity(query, candidate)
                    .map_err(|err| BackendError::Inference(err.to_string()))?;
                slot_scores.push(similarity);
            }
            scores.insert(slot, slot_scores);
        }
        Ok(scores)
    }
}
