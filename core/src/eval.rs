//! End-to-end evaluation pass
//!
//! Ties the pipeline together: shortlist lookup, batched scoring, rank-list
//! assembly, recall aggregation. Cutoffs are validated before any scoring
//! work starts.

use crate::candidates::CandidateCache;
use crate::features::FeatureSet;
use crate::rank;
use crate::recall::{self, GroundTruth, RecallReport, ZeroRelevancePolicy};
use crate::scorer::BatchScorer;
use crate::RerankError;
use rerank_eval_backend::Backend;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct EvalConfig {
    /// Queries scored per backend call
    pub batch_size: usize,
    /// Query and gallery share an identity space; drop each query's own
    /// gallery entry from its rank list
    pub exclude_self: bool,
    /// Recall cutoffs
    pub ks: Vec<usize>,
    pub zero_relevance: ZeroRelevancePolicy,
    /// Evaluate only the first N queries
    pub limit: Option<usize>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            exclude_self: true,
            ks: vec![1, 2, 4, 8],
            zero_relevance: ZeroRelevancePolicy::default(),
            limit: None,
        }
    }
}

/// Result of one full pass: the per-query rank lists and the recall summary
#[derive(Debug)]
pub struct Evaluation {
    pub rank_lists: Vec<Vec<u32>>,
    pub report: RecallReport,
}

#[instrument(skip_all)]
pub async fn evaluate(
    backend: Backend,
    queries: &FeatureSet,
    gallery: &FeatureSet,
    cache: &CandidateCache,
    ground_truth: &GroundTruth,
    config: &EvalConfig,
) -> Result<Evaluation, RerankError> {
    recall::validate_ks(&config.ks, cache.width())?;

    let scorer = BatchScorer::new(backend, queries, gallery, cache, config.batch_size)?;
    let scored = scorer.score_all(config.limit).await?;

    let mut rank_lists = Vec::with_capacity(scored.len());
    for (query, candidates) in scored.into_iter().enumerate() {
        rank_lists.push(rank::assemble(query, candidates, config.exclude_self)?);
    }

    let report = recall::aggregate(&rank_lists, ground_truth, &config.ks, config.zero_relevance)?;

    tracing::info!(
        "Evaluated {} of {} queries ({} policy)",
        report.evaluated,
        report.total,
        report.policy
    );
    for (k, value) in &report.recall {
        tracing::info!("recall@{k}: {value:.4}");
    }

    Ok(Evaluation { rank_lists, report })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recall::ReportError;
    use nohash_hasher::IntMap;
    use rerank_eval_backend::{CoreBackend, ScoreBatch, Scores};

    /// Plain dot-product scorer; tests plant per-query score tables in the
    /// gallery descriptors by making queries one-hot
    struct DotBackend;

    impl CoreBackend for DotBackend {
        fn health(&self) -> Result<(), rerank_eval_backend::BackendError> {
            Ok(())
        }

        fn score(&self, batch: ScoreBatch) -> Result<Scores, rerank_eval_backend::BackendError> {
            let mut scores: Scores = IntMap::default();
            for slot in 0..batch.len() {
                let query = batch.query_row(slot);
                let row = (0..batch.candidate_count(slot))
                    .map(|j| {
                        batch
                            .candidate_row(slot, j)
                            .iter()
                            .zip(query.iter())
                            .map(|(c, q)| c * q)
                            .sum()
                    })
                    .collect();
                scores.insert(slot, row);
            }
            Ok(scores)
        }
    }

    fn shared_identity_fixtures() -> (FeatureSet, FeatureSet, CandidateCache, GroundTruth) {
        // Gallery descriptor g holds the score each one-hot query assigns
        // to gallery item g
        let gallery = FeatureSet::from_rows(vec![
            vec![0.5, 0.6, 0.0], // 0
            vec![0.0, 0.7, 0.6], // 1
            vec![0.6, 0.0, 0.7], // 2
            vec![0.8, 0.0, 0.5], // 3
            vec![0.0, 0.9, 0.0], // 4
            vec![0.0, 0.0, 0.8], // 5
            vec![0.0, 0.5, 0.0], // 6
            vec![0.9, 0.0, 0.0], // 7
            vec![0.0, 0.8, 0.0], // 8
            vec![0.7, 0.0, 0.9], // 9
        ])
        .unwrap();
        let queries = FeatureSet::from_rows(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, 1.0],
        ])
        .unwrap();
        let cache = CandidateCache::from_rows(
            vec![vec![0, 7, 3, 9, 2], vec![1, 4, 8, 0, 6], vec![2, 9, 5, 1, 3]],
            10,
        )
        .unwrap();
        let ground_truth = GroundTruth::from_rows(vec![vec![7], vec![4, 8], vec![9]]);
        (queries, gallery, cache, ground_truth)
    }

    fn pool() -> Backend {
        Backend::new(vec![Box::new(DotBackend) as _]).unwrap()
    }

    #[tokio::test]
    async fn test_full_pass_over_shared_identity_space() {
        let (queries, gallery, cache, ground_truth) = shared_identity_fixtures();
        let config = EvalConfig {
            batch_size: 2,
            ks: vec![1, 2, 4],
            ..EvalConfig::default()
        };

        let evaluation = evaluate(pool(), &queries, &gallery, &cache, &ground_truth, &config)
            .await
            .unwrap();

        assert_eq!(
            evaluation.rank_lists,
            vec![vec![7, 3, 9, 2], vec![4, 8, 0, 6], vec![9, 5, 1, 3]]
        );
        assert_eq!(evaluation.report.recall[&1], 1.0);
        assert_eq!(evaluation.report.recall[&2], 1.0);
        assert_eq!(evaluation.report.recall[&4], 1.0);
        assert_eq!(evaluation.report.evaluated, 3);
    }

    #[tokio::test]
    async fn test_self_matches_survive_distinct_identity_spaces() {
        let (queries, gallery, cache, ground_truth) = shared_identity_fixtures();
        let config = EvalConfig {
            batch_size: 3,
            exclude_self: false,
            ks: vec![1, 4],
            ..EvalConfig::default()
        };

        let evaluation = evaluate(pool(), &queries, &gallery, &cache, &ground_truth, &config)
            .await
            .unwrap();

        for ranks in &evaluation.rank_lists {
            assert_eq!(ranks.len(), cache.width());
        }
        assert_eq!(evaluation.rank_lists[0], vec![7, 3, 9, 2, 0]);
    }

    #[tokio::test]
    async fn test_limit_restricts_the_pass() {
        let (queries, gallery, cache, ground_truth) = shared_identity_fixtures();
        let config = EvalConfig {
            batch_size: 2,
            ks: vec![1],
            limit: Some(2),
            ..EvalConfig::default()
        };

        let evaluation = evaluate(pool(), &queries, &gallery, &cache, &ground_truth, &config)
            .await
            .unwrap();

        assert_eq!(evaluation.rank_lists.len(), 2);
        assert_eq!(evaluation.report.total, 2);
        assert_eq!(evaluation.report.recall[&1], 1.0);
    }

    #[tokio::test]
    async fn test_oversized_cutoff_fails_before_scoring() {
        let (queries, gallery, cache, ground_truth) = shared_identity_fixtures();
        let config = EvalConfig {
            // Guaranteed rank-list length is width - 1 = 4
            ks: vec![5],
            ..EvalConfig::default()
        };

        let err = evaluate(pool(), &queries, &gallery, &cache, &ground_truth, &config)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RerankError::Report(ReportError::KOutOfRange { k: 5, max: 4 })
        ));
    }
}
