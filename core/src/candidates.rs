//! Coarse-retrieval candidate cache
//!
//! The cache is the precomputed nearest-neighbor shortlist: one fixed-width
//! row of gallery indices per query. It is loaded fully into memory before an
//! evaluation pass begins and never mutated afterwards. Lookups are pure; all
//! shape and content validation happens at load time.

use nohash_hasher::IntSet;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct CandidateCache {
    /// Flattened rows, `num_queries * width` gallery indices
    rows: Vec<u32>,
    num_queries: usize,
    width: usize,
}

impl CandidateCache {
    /// Build a cache from parsed rows, validating the shortlist invariants:
    /// uniform row width, indices inside the gallery, no duplicate index
    /// within a row.
    pub fn from_rows(rows: Vec<Vec<u32>>, num_gallery: usize) -> Result<Self, LookupError> {
        let num_queries = rows.len();
        let width = rows.first().map(|r| r.len()).unwrap_or(0);

        let mut flat = Vec::with_capacity(num_queries * width);
        let mut seen: IntSet<u32> = IntSet::default();
        for (query, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(LookupError::Malformed(format!(
                    "Row {} holds {} candidates, expected {}",
                    query,
                    row.len(),
                    width
                )));
            }
            seen.clear();
            for &index in &row {
                if index as usize >= num_gallery {
                    return Err(LookupError::Malformed(format!(
                        "Row {} references gallery index {} but the gallery holds {} items",
                        query, index, num_gallery
                    )));
                }
                if !seen.insert(index) {
                    return Err(LookupError::Malformed(format!(
                        "Row {} holds gallery index {} more than once",
                        query, index
                    )));
                }
            }
            flat.extend(row);
        }

        tracing::info!("Loaded candidate cache: {num_queries} queries x {width} candidates");

        Ok(Self {
            rows: flat,
            num_queries,
            width,
        })
    }

    /// Load a cache file: a JSON array of equal-length gallery-index rows
    pub fn load(path: &Path, num_gallery: usize) -> Result<Self, LookupError> {
        let file = std::fs::File::open(path)?;
        let rows: Vec<Vec<u32>> = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::from_rows(rows, num_gallery)
    }

    pub fn candidates_for(&self, query: usize) -> Result<&[u32], LookupError> {
        if query >= self.num_queries {
            return Err(LookupError::QueryOutOfRange {
                index: query,
                len: self.num_queries,
            });
        }
        Ok(&self.rows[query * self.width..(query + 1) * self.width])
    }

    /// Shortlist length L, uniform across queries
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn num_queries(&self) -> usize {
        self.num_queries
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Could not read candidate cache: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse candidate cache: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Malformed candidate cache: {0}")]
    Malformed(String),
    #[error("Query index {index} is out of range for a cache of {len} queries")]
    QueryOutOfRange { index: usize, len: usize },
}
