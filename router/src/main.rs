use anyhow::Result;
use clap::Parser;
use rerank_eval_core::recall::ZeroRelevancePolicy;
use std::path::PathBuf;

/// App Configuration
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// The candidate cache to rerank: a JSON array holding, for every query,
    /// one fixed-length row of coarse nearest-neighbor gallery indices.
    #[clap(long, env)]
    candidates: PathBuf,

    /// Query descriptor file: a JSON array of equal-length f32 rows, one per
    /// query, in the same order as the candidate cache rows
    #[clap(long, env)]
    query_features: PathBuf,

    /// Gallery descriptor file: a JSON array of equal-length f32 rows, one
    /// per gallery item
    #[clap(long, env)]
    gallery_features: PathBuf,

    /// Ground-truth relevance file: a JSON array holding, for every query,
    /// the gallery indices that count as relevant
    #[clap(long, env)]
    ground_truth: PathBuf,

    /// Comma-separated recall cutoffs, e.g. `1,2,4,8`.
    ///
    /// Every cutoff is validated against the shortlist width before scoring
    /// starts: the guaranteed rank-list length is one less than the width
    /// because self-match removal may drop an entry.
    #[clap(default_value = "1,2,4,8", long, env)]
    recall_ks: String,

    /// Number of queries scored per backend call.
    ///
    /// Larger batches amortize per-call dispatch overhead; the value is
    /// clamped to the backend's own maximum when it declares one.
    #[clap(default_value = "32", long, env)]
    batch_size: usize,

    /// Number of scoring replicas.
    ///
    /// Each replica holds an independent model instance on its own worker
    /// thread; batches are distributed over all replicas.
    #[clap(default_value = "1", long, env)]
    replicas: usize,

    /// Keep each query's own gallery entry in its rank list.
    ///
    /// Set this when query and gallery are distinct collections that merely
    /// share index numbering; leave it unset for self-retrieval settings
    /// where the query itself appears in the gallery.
    #[clap(long, env)]
    keep_self_matches: bool,

    /// How queries without a single relevant gallery item are counted
    #[clap(default_value = "count-as-miss", long, env, value_enum)]
    zero_relevance: ZeroRelevancePolicy,

    /// Evaluate only the first N queries
    #[clap(long, env)]
    limit: Option<usize>,

    /// Where to write the rank-list export
    #[clap(default_value = "ranks.json", long, env)]
    ranks_out: PathBuf,

    /// Where to write the recall report
    #[clap(default_value = "recall.json", long, env)]
    report_out: PathBuf,

    /// Outputs the logs in JSON format (useful for telemetry)
    #[clap(long, env)]
    json_output: bool,

    // Whether or not to include the log trace through spans
    #[clap(long, env)]
    disable_spans: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Pattern match configuration
    let args: Args = Args::parse();

    // Initialize logging
    rerank_eval_router::init_logging(args.json_output, args.disable_spans);

    tracing::info!("{args:?}");

    let recall_ks = rerank_eval_router::parse_recall_ks(&args.recall_ks)?;

    rerank_eval_router::run(
        &args.candidates,
        &args.query_features,
        &args.gallery_features,
        &args.ground_truth,
        recall_ks,
        args.batch_size,
        args.replicas,
        args.keep_self_matches,
        args.zero_relevance,
        args.limit,
        &args.ranks_out,
        &args.report_out,
    )
    .await
}
