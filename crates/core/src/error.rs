use thiserror::Error;

use crate::model::{AttemptError, CatalogError};
use crate::result::ResultError;
use crate::scoring::ScoringError;

/// Umbrella error for callers that do not care which domain rule failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Attempt(#[from] AttemptError),
    #[error(transparent)]
    Scoring(#[from] ScoringError),
    #[error(transparent)]
    Result(#[from] ResultError),
}
