/// Reranking evaluation runner
pub mod logging;
pub mod serialize;

pub use logging::init_logging;

use anyhow::{Context, Result};
use rerank_eval_backend::{Backend, CoreBackend, SimilarityBackend};
use rerank_eval_core::candidates::CandidateCache;
use rerank_eval_core::eval::{self, EvalConfig};
use rerank_eval_core::features::FeatureSet;
use rerank_eval_core::recall::{GroundTruth, ZeroRelevancePolicy};
use std::path::Path;

/// Parse a comma-separated cutoff list such as "1,2,4,8"
pub fn parse_recall_ks(raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<usize>()
                .with_context(|| format!("Invalid recall cutoff: {part:?}"))
        })
        .collect()
}

/// Load the evaluation inputs, run one full pass, write both exports
#[allow(clippy::too_many_arguments)]
pub async fn run(
    candidates: &Path,
    query_features: &Path,
    gallery_features: &Path,
    ground_truth: &Path,
    recall_ks: Vec<usize>,
    batch_size: usize,
    replicas: usize,
    keep_self_matches: bool,
    zero_relevance: ZeroRelevancePolicy,
    limit: Option<usize>,
    ranks_out: &Path,
    report_out: &Path,
) -> Result<()> {
    let queries = FeatureSet::load(query_features).context("Could not load query features")?;
    let gallery = FeatureSet::load(gallery_features).context("Could not load gallery features")?;
    let cache = CandidateCache::load(candidates, gallery.len())
        .context("Could not load candidate cache")?;

    let file = std::fs::File::open(ground_truth).context("Could not open ground truth")?;
    let rows: Vec<Vec<u32>> = serde_json::from_reader(std::io::BufReader::new(file))
        .context("Could not parse ground truth")?;
    let ground_truth = GroundTruth::from_rows(rows);

    tracing::info!(
        "Loaded {} queries against {} gallery items (dim {})",
        queries.len(),
        gallery.len(),
        gallery.dim()
    );

    let replicas: Vec<Box<dyn CoreBackend + Send>> = (0..replicas.max(1))
        .map(|_| Box::new(SimilarityBackend::new()) as Box<dyn CoreBackend + Send>)
        .collect();
    let backend = Backend::new(replicas)?;

    let config = EvalConfig {
        batch_size,
        exclude_self: !keep_self_matches,
        ks: recall_ks,
        zero_relevance,
        limit,
    };
    let evaluation =
        eval::evaluate(backend, &queries, &gallery, &cache, &ground_truth, &config).await?;

    serialize::write_ranks(ranks_out, &evaluation.rank_lists)?;
    serialize::write_report(report_out, &evaluation.report)?;

    Ok(())
}
