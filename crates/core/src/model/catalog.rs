use std::collections::HashSet;

use thiserror::Error;
use url::Url;

use crate::model::ids::{OptionId, QuestionId, QuestionSetId};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("question set title cannot be empty")]
    EmptyTitle,

    #[error("invalid video reference: {0}")]
    InvalidVideoRef(String),

    #[error("question {question_id} text cannot be empty")]
    EmptyQuestionText { question_id: QuestionId },

    #[error("option {option_id} text cannot be empty")]
    EmptyOptionText { option_id: OptionId },

    #[error("question {question_id} has {count} options; {kind} requires {expected}")]
    OptionCount {
        question_id: QuestionId,
        kind: QuestionKind,
        count: usize,
        expected: &'static str,
    },

    #[error("question {question_id} must have exactly one correct option, found {found}")]
    CorrectOptionCount { question_id: QuestionId, found: usize },

    #[error("question {question_id} repeats option id {option_id}")]
    DuplicateOption {
        question_id: QuestionId,
        option_id: OptionId,
    },

    #[error("question set repeats question id {0}")]
    DuplicateQuestion(QuestionId),

    #[error("unknown {field}: {value}")]
    UnknownVariant { field: &'static str, value: String },
}

//
// ─── ENUMS ─────────────────────────────────────────────────────────────────────
//

/// Publication state of a question set. Draft sets are invisible to students.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetStatus {
    Draft,
    Active,
}

impl SetStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SetStatus::Draft => "draft",
            SetStatus::Active => "active",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownVariant` for anything other than `draft` or `active`.
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        match value {
            "draft" => Ok(SetStatus::Draft),
            "active" => Ok(SetStatus::Active),
            other => Err(CatalogError::UnknownVariant {
                field: "set status",
                value: other.to_owned(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice,
    TrueFalse,
}

impl QuestionKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "multiple_choice",
            QuestionKind::TrueFalse => "true_false",
        }
    }

    /// Parses the storage representation.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownVariant` for unrecognized kinds.
    pub fn parse(value: &str) -> Result<Self, CatalogError> {
        match value {
            "multiple_choice" => Ok(QuestionKind::MultipleChoice),
            "true_false" => Ok(QuestionKind::TrueFalse),
            other => Err(CatalogError::UnknownVariant {
                field: "question kind",
                value: other.to_owned(),
            }),
        }
    }

    fn accepts_option_count(self, count: usize) -> bool {
        match self {
            QuestionKind::MultipleChoice => (2..=6).contains(&count),
            QuestionKind::TrueFalse => count == 2,
        }
    }

    fn expected_option_count(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "2 to 6",
            QuestionKind::TrueFalse => "exactly 2",
        }
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ─── OPTION ────────────────────────────────────────────────────────────────────
//

/// One selectable answer of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerOption {
    id: OptionId,
    text: String,
    is_correct: bool,
}

impl AnswerOption {
    #[must_use]
    pub fn new(id: OptionId, text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            id,
            text: text.into().trim().to_owned(),
            is_correct,
        }
    }

    #[must_use]
    pub fn id(&self) -> OptionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

//
// ─── QUESTION ──────────────────────────────────────────────────────────────────
//

/// A validated quiz question with exactly one correct option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    id: QuestionId,
    text: String,
    kind: QuestionKind,
    options: Vec<AnswerOption>,
    correct: OptionId,
}

impl Question {
    /// Builds a question, enforcing option count and the single-correct-option rule.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` when text is blank, the option count does not match
    /// the kind, option ids repeat, or the number of correct options is not one.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        kind: QuestionKind,
        options: Vec<AnswerOption>,
    ) -> Result<Self, CatalogError> {
        let text = text.into().trim().to_owned();
        if text.is_empty() {
            return Err(CatalogError::EmptyQuestionText { question_id: id });
        }

        if !kind.accepts_option_count(options.len()) {
            return Err(CatalogError::OptionCount {
                question_id: id,
                kind,
                count: options.len(),
                expected: kind.expected_option_count(),
            });
        }

        let mut seen = HashSet::with_capacity(options.len());
        for option in &options {
            if option.text.is_empty() {
                return Err(CatalogError::EmptyOptionText {
                    option_id: option.id,
                });
            }
            if !seen.insert(option.id) {
                return Err(CatalogError::DuplicateOption {
                    question_id: id,
                    option_id: option.id,
                });
            }
        }

        let mut correct = options.iter().filter(|o| o.is_correct);
        let (Some(first), None) = (correct.next(), correct.next()) else {
            let found = options.iter().filter(|o| o.is_correct).count();
            return Err(CatalogError::CorrectOptionCount {
                question_id: id,
                found,
            });
        };
        let correct = first.id;

        Ok(Self {
            id,
            text,
            kind,
            options,
            correct,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn kind(&self) -> QuestionKind {
        self.kind
    }

    #[must_use]
    pub fn options(&self) -> &[AnswerOption] {
        &self.options
    }

    #[must_use]
    pub fn correct_option_id(&self) -> OptionId {
        self.correct
    }

    #[must_use]
    pub fn has_option(&self, option_id: OptionId) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

//
// ─── QUESTION SET ──────────────────────────────────────────────────────────────
//

/// An ordered unit of video + quiz content ("week").
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionSet {
    id: QuestionSetId,
    title: String,
    description: Option<String>,
    sort_order: i64,
    video_ref: Option<Url>,
    status: SetStatus,
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Builds a question set.
    ///
    /// Title and description are trimmed; a blank description is dropped.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::EmptyTitle`, `CatalogError::InvalidVideoRef`, or
    /// `CatalogError::DuplicateQuestion`.
    pub fn new(
        id: QuestionSetId,
        title: impl Into<String>,
        description: Option<String>,
        sort_order: i64,
        video_ref: Option<&str>,
        status: SetStatus,
        questions: Vec<Question>,
    ) -> Result<Self, CatalogError> {
        let title = title.into().trim().to_owned();
        if title.is_empty() {
            return Err(CatalogError::EmptyTitle);
        }

        let description = description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        let video_ref = video_ref
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| Url::parse(v).map_err(|e| CatalogError::InvalidVideoRef(format!("{v}: {e}"))))
            .transpose()?;

        let mut seen = HashSet::with_capacity(questions.len());
        for question in &questions {
            if !seen.insert(question.id) {
                return Err(CatalogError::DuplicateQuestion(question.id));
            }
        }

        Ok(Self {
            id,
            title,
            description,
            sort_order,
            video_ref,
            status,
            questions,
        })
    }

    // Accessors
    #[must_use]
    pub fn id(&self) -> QuestionSetId {
        self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn sort_order(&self) -> i64 {
        self.sort_order
    }

    #[must_use]
    pub fn video_ref(&self) -> Option<&Url> {
        self.video_ref.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> SetStatus {
        self.status
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == SetStatus::Active
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
