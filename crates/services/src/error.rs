//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{AttemptId, OptionId, QuestionId, QuestionSetId};
use quiz_core::result::ResultError;
use quiz_core::scoring::ScoringError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Coarse classification callers branch on when presenting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The student may not perform this action yet (locked set, not entered).
    PreconditionViolation,
    NotFound,
    /// The action does not apply in the current lifecycle state.
    InvalidState,
    ValidationFailure,
    /// Storage or infrastructure failure.
    Backend,
}

/// Input that is well-formed but does not fit the catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    #[error("option {option_id} does not belong to question {question_id}")]
    OptionNotInQuestion {
        question_id: QuestionId,
        option_id: OptionId,
    },

    #[error("question set {0} has no questions")]
    EmptyQuestionSet(QuestionSetId),
}

/// Errors emitted by the practice, progress and result services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PracticeError {
    #[error("question set {0} is locked")]
    SetLocked(QuestionSetId),

    #[error("question set {question_set_id} is already completed")]
    AlreadyCompleted {
        question_set_id: QuestionSetId,
        attempt_id: Option<AttemptId>,
    },

    #[error("question set {0} has not been completed")]
    NotCompleted(QuestionSetId),

    #[error("practice has not been entered")]
    NotStarted,

    #[error("attempt {0} is already submitted")]
    AlreadySubmitted(AttemptId),

    #[error("question set {0} not found")]
    QuestionSetNotFound(QuestionSetId),

    #[error("attempt {0} not found")]
    AttemptNotFound(AttemptId),

    #[error("question {0} not found")]
    QuestionNotFound(QuestionId),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error(transparent)]
    Result(#[from] ResultError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PracticeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            PracticeError::SetLocked(_)
            | PracticeError::AlreadyCompleted { .. }
            | PracticeError::NotCompleted(_)
            | PracticeError::NotStarted => ErrorKind::PreconditionViolation,
            PracticeError::AlreadySubmitted(_) => ErrorKind::InvalidState,
            PracticeError::QuestionSetNotFound(_)
            | PracticeError::AttemptNotFound(_)
            | PracticeError::QuestionNotFound(_)
            | PracticeError::Result(_) => ErrorKind::NotFound,
            PracticeError::Validation(_) | PracticeError::Scoring(_) => {
                ErrorKind::ValidationFailure
            }
            PracticeError::Storage(StorageError::NotFound) => ErrorKind::NotFound,
            PracticeError::Storage(StorageError::Conflict) => ErrorKind::InvalidState,
            PracticeError::Storage(_) => ErrorKind::Backend,
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
