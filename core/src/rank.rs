//! Rank-list assembly
//!
//! Turns one query's scored shortlist into its final ordered rank list:
//! descending score, bit-identical ties broken by ascending gallery index so
//! the order is total and reproducible across runs and platforms. When query
//! and gallery share an identity space, the query's own gallery entry is
//! removed; the removal is a single linear scan that drops at most one
//! occurrence and leaves the relative order of everything else untouched.

use crate::scorer::ScoredCandidate;
use nohash_hasher::IntSet;
use thiserror::Error;

pub fn assemble(
    query_index: usize,
    mut scored: Vec<ScoredCandidate>,
    remove_self: bool,
) -> Result<Vec<u32>, AssemblyError> {
    // A duplicate here means the candidate-cache invariant was violated
    // upstream
    let mut seen: IntSet<u32> = IntSet::default();
    for candidate in &scored {
        if !seen.insert(candidate.index) {
            return Err(AssemblyError::DuplicateCandidate {
                query: query_index,
                index: candidate.index,
            });
        }
    }

    scored.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.index.cmp(&b.index)));

    let mut ranks = Vec::with_capacity(scored.len());
    let mut removed = 0usize;
    for candidate in scored {
        if remove_self && removed == 0 && candidate.index as usize == query_index {
            removed += 1;
            continue;
        }
        ranks.push(candidate.index);
    }

    Ok(ranks)
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Gallery index {index} appears more than once in the shortlist of query {query}")]
    DuplicateCandidate { query: usize, index: u32 },
}
