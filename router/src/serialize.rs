//! Durable result exports
//!
//! Rank lists and recall summaries leave the pipeline as plain JSON. The
//! pipeline hands this layer only `u32` indices and `f64` recall values, so
//! every number maps onto a portable JSON integer or float with nothing to
//! round and nothing platform-specific to strip.

use anyhow::{Context, Result};
use rerank_eval_core::recall::RecallReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// One evaluation's rank lists: row `q` is the ordered gallery shortlist of
/// query `q`, self-match already removed
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankExport {
    pub ranks: Vec<Vec<u32>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportExport {
    /// Recall value per cutoff
    pub recall: BTreeMap<usize, f64>,
    /// Queries in the denominator
    pub evaluated: usize,
    /// Queries ranked
    pub total: usize,
    /// Zero-relevance handling the numbers were computed under
    pub zero_relevance: String,
}

impl From<&RecallReport> for ReportExport {
    fn from(report: &RecallReport) -> Self {
        Self {
            recall: report.recall.clone(),
            evaluated: report.evaluated,
            total: report.total,
            zero_relevance: report.policy.to_string(),
        }
    }
}

pub fn write_ranks(path: &Path, rank_lists: &[Vec<u32>]) -> Result<()> {
    let export = RankExport {
        ranks: rank_lists.to_vec(),
    };
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create rank export {}", path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &export)
        .with_context(|| format!("Could not write rank export {}", path.display()))?;
    tracing::info!("Wrote {} rank lists to {}", export.ranks.len(), path.display());
    Ok(())
}

pub fn read_ranks(path: &Path) -> Result<Vec<Vec<u32>>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Could not open rank export {}", path.display()))?;
    let export: RankExport = serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("Could not parse rank export {}", path.display()))?;
    Ok(export.ranks)
}

pub fn write_report(path: &Path, report: &RecallReport) -> Result<()> {
    let export = ReportExport::from(report);
    let file = std::fs::File::create(path)
        .with_context(|| format!("Could not create recall report {}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), &export)
        .with_context(|| format!("Could not write recall report {}", path.display()))?;
    tracing::info!("Wrote recall report to {}", path.display());
    Ok(())
}
