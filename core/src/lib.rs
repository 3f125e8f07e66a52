pub mod candidates;
pub mod eval;
pub mod features;
pub mod rank;
pub mod recall;
pub mod scorer;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RerankError {
    #[error("Candidate lookup error: {0}")]
    Lookup(#[from] candidates::LookupError),
    #[error("Feature set error: {0}")]
    Feature(#[from] features::FeatureError),
    #[error("Scoring error: {0}")]
    Scoring(#[from] scorer::ScoringError),
    #[error("Rank assembly error: {0}")]
    Assembly(#[from] rank::AssemblyError),
    #[error("Recall report error: {0}")]
    Report(#[from] recall::ReportError),
}
