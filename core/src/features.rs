//! Materialized descriptor matrices
//!
//! Query and gallery descriptors are produced by an external feature
//! extractor and handed to the pipeline fully materialized. Rows are stored
//! flattened to keep batch gathering a plain memcpy.

use std::path::Path;
use thiserror::Error;

/// Dense row-major f32 matrix, one descriptor per item
#[derive(Debug, Clone)]
pub struct FeatureSet {
    data: Vec<f32>,
    dim: usize,
    len: usize,
}

impl FeatureSet {
    pub fn from_rows(rows: Vec<Vec<f32>>) -> Result<Self, FeatureError> {
        let len = rows.len();
        let dim = rows.first().map(|r| r.len()).unwrap_or(0);
        if len > 0 && dim == 0 {
            return Err(FeatureError::Validation(
                "Descriptor rows cannot be empty".to_string(),
            ));
        }
        let mut data = Vec::with_capacity(len * dim);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != dim {
                return Err(FeatureError::Validation(format!(
                    "Row {} has dimension {}, expected {}",
                    i,
                    row.len(),
                    dim
                )));
            }
            data.extend(row);
        }
        Ok(Self { data, dim, len })
    }

    /// Load a feature file: a JSON array of equal-length f32 rows
    pub fn load(path: &Path) -> Result<Self, FeatureError> {
        let file = std::fs::File::open(path)?;
        let rows: Vec<Vec<f32>> = serde_json::from_reader(std::io::BufReader::new(file))?;
        Self::from_rows(rows)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Descriptor row of item `index`. Callers validate `index` first.
    pub fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Could not read feature file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not parse feature file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Feature validation error: {0}")]
    Validation(String),
}
