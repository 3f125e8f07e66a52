//! Recall aggregation
//!
//! A query scores a hit at k when any of the first k entries of its rank list
//! is relevant. Each rank list is scanned once, up to the largest configured
//! cutoff; every smaller cutoff's hit status is derived from the position of
//! the first relevant entry.

#[cfg(feature = "clap")]
use clap::ValueEnum;
use nohash_hasher::IntSet;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// How queries without a single relevant gallery item enter the recall
/// denominator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(ValueEnum))]
pub enum ZeroRelevancePolicy {
    /// Keep the query in the denominator; it can never hit
    #[default]
    CountAsMiss,
    /// Drop the query from the denominator entirely
    ExcludeQuery,
}

impl fmt::Display for ZeroRelevancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ZeroRelevancePolicy::CountAsMiss => write!(f, "count-as-miss"),
            ZeroRelevancePolicy::ExcludeQuery => write!(f, "exclude-query"),
        }
    }
}

/// Per-query sets of relevant gallery indices
#[derive(Debug, Clone)]
pub struct GroundTruth {
    relevant: Vec<IntSet<u32>>,
}

impl GroundTruth {
    pub fn from_rows(rows: Vec<Vec<u32>>) -> Self {
        let relevant = rows
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();
        Self { relevant }
    }

    pub fn len(&self) -> usize {
        self.relevant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relevant.is_empty()
    }

    pub fn is_relevant(&self, query: usize, gallery: u32) -> bool {
        self.relevant[query].contains(&gallery)
    }

    pub fn has_relevant(&self, query: usize) -> bool {
        !self.relevant[query].is_empty()
    }
}

/// Summary of one full evaluation pass
#[derive(Debug, Clone)]
pub struct RecallReport {
    /// Recall value per cutoff, in [0, 1]
    pub recall: BTreeMap<usize, f64>,
    /// Queries in the denominator
    pub evaluated: usize,
    /// Queries ranked
    pub total: usize,
    pub policy: ZeroRelevancePolicy,
}

/// Check the configured cutoffs before any scoring work starts.
///
/// The guaranteed rank-list length is `width - 1`: self-match removal may
/// drop one entry from any list. A cutoff beyond that has no consistent
/// meaning and is a configuration defect, not a runtime condition.
pub fn validate_ks(ks: &[usize], width: usize) -> Result<(), ReportError> {
    if ks.is_empty() {
        return Err(ReportError::EmptyKs);
    }
    let max = width.saturating_sub(1);
    for &k in ks {
        if k == 0 {
            return Err(ReportError::ZeroK);
        }
        if k > max {
            return Err(ReportError::KOutOfRange { k, max });
        }
    }
    Ok(())
}

/// Recall over the full query set for every configured cutoff
#[instrument(skip_all)]
pub fn aggregate(
    rank_lists: &[Vec<u32>],
    ground_truth: &GroundTruth,
    ks: &[usize],
    policy: ZeroRelevancePolicy,
) -> Result<RecallReport, ReportError> {
    if ks.is_empty() {
        return Err(ReportError::EmptyKs);
    }
    if ks.contains(&0) {
        return Err(ReportError::ZeroK);
    }
    if ground_truth.len() < rank_lists.len() {
        return Err(ReportError::GroundTruthMismatch {
            expected: rank_lists.len(),
            got: ground_truth.len(),
        });
    }

    let max_k = *ks
        .iter()
        .max()
        .expect("`ks` was checked non-empty above. This is a bug.");

    let mut hits: BTreeMap<usize, usize> = ks.iter().map(|&k| (k, 0)).collect();
    let mut evaluated = 0usize;

    for (query, ranks) in rank_lists.iter().enumerate() {
        if !ground_truth.has_relevant(query) && policy == ZeroRelevancePolicy::ExcludeQuery {
            continue;
        }
        evaluated += 1;

        // A rank list shorter than max_k (the empty-shortlist boundary) is
        // scanned to its end and simply cannot hit past its length
        let first_hit = ranks
            .iter()
            .take(max_k)
            .position(|&gallery| ground_truth.is_relevant(query, gallery));

        if let Some(position) = first_hit {
            for (&k, count) in hits.iter_mut() {
                if position < k {
                    *count += 1;
                }
            }
        }
    }

    let recall = hits
        .into_iter()
        .map(|(k, count)| {
            let value = if evaluated == 0 {
                0.0
            } else {
                count as f64 / evaluated as f64
            };
            (k, value)
        })
        .collect();

    Ok(RecallReport {
        recall,
        evaluated,
        total: rank_lists.len(),
        policy,
    })
}

/// Recall at a single cutoff
pub fn recall_at(
    k: usize,
    rank_lists: &[Vec<u32>],
    ground_truth: &GroundTruth,
    policy: ZeroRelevancePolicy,
) -> Result<f64, ReportError> {
    let report = aggregate(rank_lists, ground_truth, &[k], policy)?;
    Ok(report.recall[&k])
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("No recall cutoffs were configured")]
    EmptyKs,
    #[error("Recall cutoffs must be at least 1")]
    ZeroK,
    #[error("Recall cutoff {k} exceeds the guaranteed rank-list length {max}")]
    KOutOfRange { k: usize, max: usize },
    #[error("{expected} rank lists were produced but ground truth covers only {got} queries")]
    GroundTruthMismatch { expected: usize, got: usize },
}
