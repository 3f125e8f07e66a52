use nohash_hasher::IntMap;
use thiserror::Error;

/// A flattened batch of (query, candidate-set) pairs.
///
/// Feature rows are stored row-major. Slot `i` of the batch owns the
/// candidate rows between `cumulative_candidates[i]` and
/// `cumulative_candidates[i + 1]`.
#[derive(Debug, Clone)]
pub struct ScoreBatch {
    pub query_features: Vec<f32>,
    pub candidate_features: Vec<f32>,
    pub cumulative_candidates: Vec<u32>,
    pub dim: usize,
}

impl ScoreBatch {
    pub fn len(&self) -> usize {
        self.cumulative_candidates.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of candidates held by one slot of the batch
    pub fn candidate_count(&self, slot: usize) -> usize {
        (self.cumulative_candidates[slot + 1] - self.cumulative_candidates[slot]) as usize
    }

    /// Feature row of the query in `slot`
    pub fn query_row(&self, slot: usize) -> &[f32] {
        &self.query_features[slot * self.dim..(slot + 1) * self.dim]
    }

    /// Feature row of candidate `j` of the query in `slot`
    pub fn candidate_row(&self, slot: usize, j: usize) -> &[f32] {
        let row = self.cumulative_candidates[slot] as usize + j;
        &self.candidate_features[row * self.dim..(row + 1) * self.dim]
    }
}

/// Relevance scores keyed by batch slot. One score per candidate of the slot,
/// in candidate order.
pub type Scores = IntMap<usize, Vec<f32>>;

pub trait Backend {
    fn health(&self) -> Result<(), BackendError>;
    fn max_batch_size(&self) -> Option<usize> {
        None
    }

    fn score(&self, batch: ScoreBatch) -> Result<Scores, BackendError>;
}

#[derive(Debug, Error, Clone)]
pub enum BackendError {
    #[error("No backend found")]
    NoBackend,
    #[error("Could not start backend: {0}")]
    Start(String),
    #[error("{0}")]
    Inference(String),
    #[error("Backend is unhealthy")]
    Unhealthy,
}
