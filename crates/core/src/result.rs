//! Read-side projection of a submitted attempt into a reviewable result.

use serde::Serialize;
use thiserror::Error;

use crate::model::{Attempt, AttemptId, QuestionSet, QuestionSetId};
pub use crate::scoring::{QuestionReview, ReviewOption};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResultError {
    #[error("attempt {0} has not been submitted")]
    NotSubmitted(AttemptId),

    #[error("attempt {attempt_id} belongs to question set {expected}, not {actual}")]
    SetMismatch {
        attempt_id: AttemptId,
        expected: QuestionSetId,
        actual: QuestionSetId,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub attempt_id: AttemptId,
    pub question_set_id: QuestionSetId,
    pub question_set_title: String,
    /// Number of correct answers, as frozen at submission.
    pub score: u32,
    pub total_questions: u32,
    pub percentage: u8,
    pub passed: bool,
    pub answers: Vec<QuestionReview>,
}

/// Build the review payload for a submitted attempt.
///
/// Everything except the set title comes from the grading frozen at
/// submission, so later catalog edits never change a past result.
///
/// # Errors
///
/// Returns `ResultError::NotSubmitted` for open attempts and
/// `ResultError::SetMismatch` when `set` is not the attempt's question set.
pub fn project_result(attempt: &Attempt, set: &QuestionSet) -> Result<QuizResult, ResultError> {
    if attempt.question_set_id() != set.id() {
        return Err(ResultError::SetMismatch {
            attempt_id: attempt.id(),
            expected: attempt.question_set_id(),
            actual: set.id(),
        });
    }
    let Some(grading) = attempt.grading() else {
        return Err(ResultError::NotSubmitted(attempt.id()));
    };
    let card = grading.card();

    Ok(QuizResult {
        attempt_id: attempt.id(),
        question_set_id: set.id(),
        question_set_title: set.title().to_owned(),
        score: card.correct(),
        total_questions: card.total_questions(),
        percentage: card.percentage(),
        passed: card.passed(),
        answers: grading.review().to_vec(),
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AnswerOption, OptionId, Question, QuestionId, QuestionKind, SetStatus, UserId,
    };
    use crate::scoring::{PassPolicy, grade_attempt};
    use crate::time::fixed_now;

    fn week(questions: Vec<Question>) -> QuestionSet {
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

    fn mc(id: u64) -> Question {
        Question::new(
            QuestionId::new(id),
            format!("Question {id}"),
            QuestionKind::MultipleChoice,
            vec![
                AnswerOption::new(OptionId::new(id * 10), "A", false),
                AnswerOption::new(OptionId::new(id * 10 + 1), "B", true),
                AnswerOption::new(OptionId::new(id * 10 + 2), "C", false),
            ],
        )
        .unwrap()
    }

    fn submitted(set: &QuestionSet) -> Attempt {
        let mut attempt =
            Attempt::start(AttemptId::new(5), UserId::new(1), set.id(), fixed_now());
        attempt
            .record_answer(QuestionId::new(1), Some(OptionId::new(11)), 1)
            .unwrap();
        attempt
            .record_answer(QuestionId::new(2), Some(OptionId::new(20)), 2)
            .unwrap();
        let grading = grade_attempt(set, &attempt, PassPolicy::default()).unwrap();
        attempt.submit(grading, fixed_now()).unwrap();
        attempt
    }

    #[test]
    fn projects_per_question_correctness() {
        let set = week(vec![mc(1), mc(2), mc(3)]);
        let result = project_result(&submitted(&set), &set).unwrap();

        assert_eq!(result.score, 1);
        assert_eq!(result.total_questions, 3);
        assert_eq!(result.percentage, 33);
        assert!(!result.passed);
        assert_eq!(result.question_set_title, "Week 1");

        assert!(result.answers[0].is_correct);
        assert_eq!(result.answers[0].correct_option_id, OptionId::new(11));

        assert!(!result.answers[1].is_correct);
        assert_eq!(result.answers[1].selected_option_id, Some(OptionId::new(20)));

        assert!(!result.answers[2].is_correct);
        assert_eq!(result.answers[2].selected_option_id, None);
        assert_eq!(result.answers[2].options.len(), 3);
        assert!(result.answers[2].options[1].is_correct);
    }

    #[test]
    fn review_stays_frozen_when_catalog_changes() {
        let original = week(vec![mc(1), mc(2), mc(3)]);
        let attempt = submitted(&original);

        // Question 1's correct option moves and question 3 is dropped.
        let moved = Question::new(
            QuestionId::new(1),
            "Question 1 (revised)",
            QuestionKind::MultipleChoice,
            vec![
                AnswerOption::new(OptionId::new(10), "A", true),
                AnswerOption::new(OptionId::new(11), "B", false),
            ],
        )
        .unwrap();
        let edited = week(vec![moved, mc(2)]);
        let result = project_result(&attempt, &edited).unwrap();

        let correct_lines = result.answers.iter().filter(|a| a.is_correct).count();
        assert_eq!(u32::try_from(correct_lines).unwrap(), result.score);
        assert_eq!(result.answers.len(), 3);
        assert_eq!(u32::try_from(result.answers.len()).unwrap(), result.total_questions);

        let first = &result.answers[0];
        assert_eq!(first.question_text, "Question 1");
        assert_eq!(first.correct_option_id, OptionId::new(11));
        assert_eq!(first.options.len(), 3);
        assert!(first.is_correct);
    }

    #[test]
    fn open_attempt_has_no_result() {
        let set = week(vec![mc(1)]);
        let attempt = Attempt::start(AttemptId::new(1), UserId::new(1), set.id(), fixed_now());
        let err = project_result(&attempt, &set).unwrap_err();
        assert_eq!(err, ResultError::NotSubmitted(AttemptId::new(1)));
    }
}
