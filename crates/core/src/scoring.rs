//! Attempt scoring.
//!
//! Scores are computed once, when an attempt is submitted, and frozen into a
//! [`Grading`]: the aggregate [`ScoreCard`] plus one [`QuestionReview`] line per
//! question as it stood at that moment. Storage persists both verbatim.

use serde::Serialize;
use thiserror::Error;

use crate::model::{Attempt, OptionId, Question, QuestionId, QuestionKind, QuestionSet};

/// Default minimum percentage for a passing attempt.
pub const DEFAULT_PASS_THRESHOLD: u8 = 70;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ScoringError {
    #[error("question set has no questions")]
    EmptyQuestionSet,

    #[error("question set has too many questions: {0}")]
    TooManyQuestions(usize),

    #[error("pass threshold must be between 0 and 100, got {0}")]
    InvalidThreshold(u8),

    #[error("invalid persisted score: {0}")]
    InvalidPersisted(String),

    #[error("review disagrees with score {expected_correct}/{expected_total}")]
    ReviewMismatch {
        lines: usize,
        correct: usize,
        expected_correct: u32,
        expected_total: u32,
    },
}

//
// ─── POLICY ────────────────────────────────────────────────────────────────────
//

/// Pass/fail policy applied at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPolicy {
    threshold: u8,
}

impl PassPolicy {
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidThreshold` when `threshold > 100`.
    pub fn new(threshold: u8) -> Result<Self, ScoringError> {
        if threshold > 100 {
            return Err(ScoringError::InvalidThreshold(threshold));
        }
        Ok(Self { threshold })
    }

    #[must_use]
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    #[must_use]
    pub fn passes(&self, percentage: u8) -> bool {
        percentage >= self.threshold
    }
}

impl Default for PassPolicy {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_PASS_THRESHOLD,
        }
    }
}

//
// ─── SCORE CARD ────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCard {
    correct: u32,
    total_questions: u32,
    percentage: u8,
    passed: bool,
}

impl ScoreCard {
    /// Rehydrate a score card from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::InvalidPersisted` if the counts are inconsistent.
    pub fn from_persisted(
        correct: u32,
        total_questions: u32,
        percentage: u8,
        passed: bool,
    ) -> Result<Self, ScoringError> {
        if total_questions == 0 {
            return Err(ScoringError::InvalidPersisted("total_questions is 0".into()));
        }
        if correct > total_questions {
            return Err(ScoringError::InvalidPersisted(format!(
                "correct ({correct}) exceeds total ({total_questions})"
            )));
        }
        if percentage > 100 {
            return Err(ScoringError::InvalidPersisted(format!(
                "percentage out of range: {percentage}"
            )));
        }
        Ok(Self {
            correct,
            total_questions,
            percentage,
            passed,
        })
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }
}

/// `round(100 * correct / total)` with halves rounded up, in integer arithmetic.
#[must_use]
pub fn rounded_percentage(correct: u32, total: u32) -> u8 {
    if total == 0 {
        return 0;
    }
    let correct = u64::from(correct.min(total));
    let total = u64::from(total);
    let pct = (200 * correct + total) / (2 * total);
    u8::try_from(pct).unwrap_or(100)
}

//
// ─── REVIEW SNAPSHOT ───────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOption {
    pub id: OptionId,
    pub text: String,
    pub is_correct: bool,
}

/// One question of a submitted attempt, copied from the catalog at submit time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionReview {
    pub question_id: QuestionId,
    pub question_text: String,
    pub kind: QuestionKind,
    pub options: Vec<ReviewOption>,
    pub selected_option_id: Option<OptionId>,
    pub correct_option_id: OptionId,
    pub is_correct: bool,
}

impl QuestionReview {
    fn capture(question: &Question, selected: Option<OptionId>) -> Self {
        let correct = question.correct_option_id();
        Self {
            question_id: question.id(),
            question_text: question.text().to_owned(),
            kind: question.kind(),
            options: question
                .options()
                .iter()
                .map(|o| ReviewOption {
                    id: o.id(),
                    text: o.text().to_owned(),
                    is_correct: o.is_correct(),
                })
                .collect(),
            selected_option_id: selected,
            correct_option_id: correct,
            is_correct: selected == Some(correct),
        }
    }
}

/// Score card and review lines frozen together at submission.
///
/// The review always has `total_questions` lines, `correct` of which are marked
/// correct, so a result page can never disagree with the stored score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grading {
    card: ScoreCard,
    review: Vec<QuestionReview>,
}

impl Grading {
    /// Rehydrate a grading from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `ScoringError::ReviewMismatch` when the review lines do not add
    /// up to the score card.
    pub fn from_persisted(
        card: ScoreCard,
        review: Vec<QuestionReview>,
    ) -> Result<Self, ScoringError> {
        let correct = review.iter().filter(|line| line.is_correct).count();
        let lines_match = u32::try_from(review.len()).is_ok_and(|n| n == card.total_questions);
        let correct_match = u32::try_from(correct).is_ok_and(|n| n == card.correct);
        if !(lines_match && correct_match) {
            return Err(ScoringError::ReviewMismatch {
                lines: review.len(),
                correct,
                expected_correct: card.correct,
                expected_total: card.total_questions,
            });
        }
        Ok(Self { card, review })
    }

    #[must_use]
    pub fn card(&self) -> &ScoreCard {
        &self.card
    }

    /// Review lines in question order.
    #[must_use]
    pub fn review(&self) -> &[QuestionReview] {
        &self.review
    }
}

/// Grade an attempt's answers against its question set.
///
/// A question is correct iff the selected option is its correct option;
/// unanswered and cleared questions are incorrect. Answers to questions that
/// are not part of the set are ignored.
///
/// # Errors
///
/// Returns `ScoringError::EmptyQuestionSet` when the set has no questions.
pub fn grade_attempt(
    set: &QuestionSet,
    attempt: &Attempt,
    policy: PassPolicy,
) -> Result<Grading, ScoringError> {
    let total = set.question_count();
    if total == 0 {
        return Err(ScoringError::EmptyQuestionSet);
    }
    let total = u32::try_from(total).map_err(|_| ScoringError::TooManyQuestions(total))?;

    let review: Vec<QuestionReview> = set
        .questions()
        .iter()
        .map(|q| QuestionReview::capture(q, attempt.selected_option(q.id())))
        .collect();

    let mut correct = 0_u32;
    for line in &review {
        if line.is_correct {
            correct = correct.saturating_add(1);
        }
    }

    let percentage = rounded_percentage(correct, total);
    let card = ScoreCard {
        correct,
        total_questions: total,
        percentage,
        passed: policy.passes(percentage),
    };
    Ok(Grading { card, review })
}

/// Aggregate score only; see [`grade_attempt`].
///
/// # Errors
///
/// Returns `ScoringError::EmptyQuestionSet` when the set has no questions.
pub fn score_attempt(
    set: &QuestionSet,
    attempt: &Attempt,
    policy: PassPolicy,
) -> Result<ScoreCard, ScoringError> {
    grade_attempt(set, attempt, policy).map(|g| g.card)
}


//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerOption, AttemptId, OptionId, Question, QuestionId, QuestionKind, QuestionSetId,
        SetStatus, UserId,
    };
    use crate::time::fixed_now;

    /// Question `n` has options `10n` (correct) and `10n + 1`.
    fn set_with(n: u64) -> QuestionSet {
        let questions = (1..=n)
            .map(|i| {
                Question::new(
                    QuestionId::new(i),
                    format!("Q{i}"),
                    QuestionKind::TrueFalse,
                    vec![
                        AnswerOption::new(OptionId::new(10 * i), "True", true),
                        AnswerOption::new(OptionId::new(10 * i + 1), "False", false),
                    ],
                )
                .unwrap()
            })
            .collect();
        QuestionSet::new(
            QuestionSetId::new(1),
            "Week 1",
            None,
            1,
            None,
            SetStatus::Active,
            questions,
        )
        .unwrap()
    }

    fn attempt() -> Attempt {
        Attempt::start(AttemptId::new(1), UserId::new(1), QuestionSetId::new(1), fixed_now())
    }

    #[test]
    fn three_of_four_with_one_blank_passes_at_seventy() {
        let set = set_with(4);
        let mut a = attempt();
        a.record_answer(QuestionId::new(1), Some(OptionId::new(10)), 1).unwrap();
        a.record_answer(QuestionId::new(2), Some(OptionId::new(20)), 2).unwrap();
        a.record_answer(QuestionId::new(3), Some(OptionId::new(30)), 3).unwrap();

        let card = score_attempt(&set, &a, PassPolicy::default()).unwrap();
        assert_eq!(card.correct(), 3);
        assert_eq!(card.total_questions(), 4);
        assert_eq!(card.percentage(), 75);
        assert!(card.passed());
    }

    #[test]
    fn nothing_answered_scores_zero() {
        let card = score_attempt(&set_with(5), &attempt(), PassPolicy::default()).unwrap();
        assert_eq!(card.correct(), 0);
        assert_eq!(card.percentage(), 0);
        assert!(!card.passed());
    }

    #[test]
    fn all_correct_scores_hundred() {
        let set = set_with(3);
        let mut a = attempt();
        for i in 1..=3 {
            a.record_answer(QuestionId::new(i), Some(OptionId::new(10 * i)), i).unwrap();
        }
        let card = score_attempt(&set, &a, PassPolicy::default()).unwrap();
        assert_eq!(card.percentage(), 100);
    }

    #[test]
    fn wrong_and_foreign_answers_do_not_count() {
        let set = set_with(2);
        let mut a = attempt();
        a.record_answer(QuestionId::new(1), Some(OptionId::new(11)), 1).unwrap();
        a.record_answer(QuestionId::new(99), Some(OptionId::new(990)), 2).unwrap();
        let card = score_attempt(&set, &a, PassPolicy::default()).unwrap();
        assert_eq!(card.correct(), 0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let set = set_with(3);
        let mut a = attempt();
        a.record_answer(QuestionId::new(2), Some(OptionId::new(20)), 1).unwrap();
        let first = score_attempt(&set, &a, PassPolicy::default()).unwrap();
        let second = score_attempt(&set, &a, PassPolicy::default()).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.percentage(), 33);
    }

    #[test]
    fn empty_set_is_rejected() {
        let err = score_attempt(&set_with(0), &attempt(), PassPolicy::default()).unwrap_err();
        assert_eq!(err, ScoringError::EmptyQuestionSet);
    }

    #[test]
    fn rounding_goes_half_up() {
        assert_eq!(rounded_percentage(1, 8), 13);
        assert_eq!(rounded_percentage(2, 3), 67);
        assert_eq!(rounded_percentage(1, 200), 1);
        assert_eq!(rounded_percentage(0, 0), 0);
    }

    #[test]
    fn policy_threshold_is_configurable() {
        let strict = PassPolicy::new(80).unwrap();
        assert!(!strict.passes(75));
        assert!(strict.passes(80));
        assert_eq!(PassPolicy::new(101).unwrap_err(), ScoringError::InvalidThreshold(101));
    }

    #[test]
    fn grading_snapshots_each_question() {
        let set = set_with(2);
        let mut a = attempt();
        a.record_answer(QuestionId::new(2), Some(OptionId::new(20)), 1).unwrap();

        let grading = grade_attempt(&set, &a, PassPolicy::default()).unwrap();
        let review = grading.review();
        assert_eq!(review.len(), 2);
        assert_eq!(review[0].selected_option_id, None);
        assert!(!review[0].is_correct);
        assert!(review[1].is_correct);
        assert_eq!(review[1].question_text, "Q2");
        assert_eq!(review[1].options.len(), 2);
        assert_eq!(grading.card().correct(), 1);
    }

    #[test]
    fn persisted_review_must_match_card() {
        let card = ScoreCard::from_persisted(1, 2, 50, false).unwrap();
        let lines = vec![fixtures::review_line(1, true), fixtures::review_line(2, true)];
        let err = Grading::from_persisted(card, lines).unwrap_err();
        assert!(matches!(err, ScoringError::ReviewMismatch { correct: 2, .. }));

        let err = Grading::from_persisted(card, vec![fixtures::review_line(1, true)]).unwrap_err();
        assert!(matches!(err, ScoringError::ReviewMismatch { lines: 1, .. }));

        assert_eq!(fixtures::grading(1, 2, 50, false).card(), &card);
    }

    #[test]
    fn persisted_card_is_validated() {
        assert!(ScoreCard::from_persisted(3, 2, 100, true).is_err());
        assert!(ScoreCard::from_persisted(0, 0, 0, false).is_err());
        assert!(ScoreCard::from_persisted(1, 2, 50, false).is_ok());
    }
}
