use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::model::ids::{AttemptId, OptionId, QuestionId, QuestionSetId, UserId};
use crate::scoring::{Grading, QuestionReview, ScoreCard};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AttemptError {
    #[error("attempt {attempt_id} is already submitted")]
    AlreadySubmitted { attempt_id: AttemptId },

    #[error("submitted_at is before started_at")]
    InvalidTimeRange,

    #[error("invalid persisted attempt state: {0}")]
    InvalidPersistedState(String),

    #[error("unknown attempt status: {0}")]
    UnknownStatus(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

/// Lifecycle of a stored attempt. `Submitted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
}

impl AttemptStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::UnknownStatus` for unrecognized values.
    pub fn parse(value: &str) -> Result<Self, AttemptError> {
        match value {
            "in_progress" => Ok(AttemptStatus::InProgress),
            "submitted" => Ok(AttemptStatus::Submitted),
            other => Err(AttemptError::UnknownStatus(other.to_owned())),
        }
    }
}

//
// ─── ANSWERS ───────────────────────────────────────────────────────────────────
//

/// A recorded answer. `selected == None` means the question was cleared.
///
/// `seq` is the per-attempt sequence number of the write that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Answer {
    pub selected: Option<OptionId>,
    pub seq: u64,
}

/// Outcome of an answer upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerWrite {
    /// The write was newer than what was stored and replaced it.
    Applied,
    /// A write with an equal or higher sequence number was already stored.
    Stale,
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// One student's pass through one question set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    id: AttemptId,
    user_id: UserId,
    question_set_id: QuestionSetId,
    status: AttemptStatus,
    answers: BTreeMap<QuestionId, Answer>,
    started_at: DateTime<Utc>,
    submitted_at: Option<DateTime<Utc>>,
    grading: Option<Grading>,
}

impl Attempt {
    /// Opens a fresh attempt with no answers.
    #[must_use]
    pub fn start(
        id: AttemptId,
        user_id: UserId,
        question_set_id: QuestionSetId,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            question_set_id,
            status: AttemptStatus::InProgress,
            answers: BTreeMap::new(),
            started_at,
            submitted_at: None,
            grading: None,
        }
    }

    /// Rehydrate an attempt from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::InvalidPersistedState` when status, submission time and
    /// grading disagree, or `AttemptError::InvalidTimeRange` when submission predates start.
    #[allow(clippy::too_many_arguments)]
    pub fn from_persisted(
        id: AttemptId,
        user_id: UserId,
        question_set_id: QuestionSetId,
        status: AttemptStatus,
        answers: BTreeMap<QuestionId, Answer>,
        started_at: DateTime<Utc>,
        submitted_at: Option<DateTime<Utc>>,
        grading: Option<Grading>,
    ) -> Result<Self, AttemptError> {
        match (status, submitted_at, &grading) {
            (AttemptStatus::InProgress, None, None) => {}
            (AttemptStatus::Submitted, Some(at), Some(_)) => {
                if at < started_at {
                    return Err(AttemptError::InvalidTimeRange);
                }
            }
            (AttemptStatus::InProgress, _, _) => {
                return Err(AttemptError::InvalidPersistedState(
                    "in-progress attempt carries submission data".into(),
                ));
            }
            (AttemptStatus::Submitted, _, _) => {
                return Err(AttemptError::InvalidPersistedState(
                    "submitted attempt is missing submitted_at or grading".into(),
                ));
            }
        }

        Ok(Self {
            id,
            user_id,
            question_set_id,
            status,
            answers,
            started_at,
            submitted_at,
            grading,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> AttemptId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn question_set_id(&self) -> QuestionSetId {
        self.question_set_id
    }

    #[must_use]
    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == AttemptStatus::InProgress
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn submitted_at(&self) -> Option<DateTime<Utc>> {
        self.submitted_at
    }

    /// Score frozen at submission time; `None` while in progress.
    #[must_use]
    pub fn score(&self) -> Option<&ScoreCard> {
        self.grading.as_ref().map(Grading::card)
    }

    /// Per-question review frozen at submission; empty while in progress.
    #[must_use]
    pub fn review(&self) -> &[QuestionReview] {
        self.grading.as_ref().map(Grading::review).unwrap_or_default()
    }

    #[must_use]
    pub fn grading(&self) -> Option<&Grading> {
        self.grading.as_ref()
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }

    /// Selected option for a question; `None` when unanswered or cleared.
    #[must_use]
    pub fn selected_option(&self, question_id: QuestionId) -> Option<OptionId> {
        self.answers.get(&question_id).and_then(|a| a.selected)
    }

    /// Highest sequence number recorded so far (0 when no answers exist).
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.answers.values().map(|a| a.seq).max().unwrap_or(0)
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.answers.values().filter(|a| a.selected.is_some()).count()
    }

    /// Upsert one answer, keeping the write with the highest sequence number.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` once the attempt is submitted.
    pub fn record_answer(
        &mut self,
        question_id: QuestionId,
        selected: Option<OptionId>,
        seq: u64,
    ) -> Result<AnswerWrite, AttemptError> {
        if !self.is_open() {
            return Err(AttemptError::AlreadySubmitted {
                attempt_id: self.id,
            });
        }

        if let Some(existing) = self.answers.get(&question_id) {
            if existing.seq >= seq {
                return Ok(AnswerWrite::Stale);
            }
        }

        self.answers.insert(question_id, Answer { selected, seq });
        Ok(AnswerWrite::Applied)
    }

    /// Freeze the grading and close the attempt.
    ///
    /// # Errors
    ///
    /// Returns `AttemptError::AlreadySubmitted` on a second submission, and
    /// `AttemptError::InvalidTimeRange` if `submitted_at` predates `started_at`.
    pub fn submit(
        &mut self,
        grading: Grading,
        submitted_at: DateTime<Utc>,
    ) -> Result<(), AttemptError> {
        if !self.is_open() {
            return Err(AttemptError::AlreadySubmitted {
                attempt_id: self.id,
            });
        }
        if submitted_at < self.started_at {
            return Err(AttemptError::InvalidTimeRange);
        }

        self.status = AttemptStatus::Submitted;
        self.submitted_at = Some(submitted_at);
        self.grading = Some(grading);
        Ok(())
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
