use quiz_core::model::{
    AnswerWrite, Attempt, AttemptId, OptionId, Question, QuestionId, QuestionSet, UserId,
};
use quiz_core::scoring::ScoreCard;

use crate::error::{PracticeError, ValidationError};

//
// ─── STATE ─────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    NotStarted,
    InProgress,
    /// Terminal.
    Submitted,
}

/// A validated, sequenced selection ready to be persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PendingSelection {
    pub attempt_id: AttemptId,
    pub question_id: QuestionId,
    pub selected: Option<OptionId>,
    pub seq: u64,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// One student's interactive pass through one question set.
///
/// Holds a snapshot of the set, a mirror of the stored attempt and the
/// navigation cursor. The cursor is never persisted. Every selection is
/// stamped with the next sequence number of this session, continuing from
/// the highest one already stored for the attempt.
#[derive(Debug, Clone)]
pub struct AttemptSession {
    user_id: UserId,
    set: QuestionSet,
    state: SessionState,
    attempt: Option<Attempt>,
    last_seq: u64,
    cursor: usize,
}

impl AttemptSession {
    /// A session that has not entered practice yet.
    #[must_use]
    pub fn new(user_id: UserId, set: QuestionSet) -> Self {
        Self {
            user_id,
            set,
            state: SessionState::NotStarted,
            attempt: None,
            last_seq: 0,
            cursor: 0,
        }
    }

    pub(crate) fn begin(&mut self, attempt: Attempt) {
        self.last_seq = attempt.last_seq();
        self.state = if attempt.is_open() {
            SessionState::InProgress
        } else {
            SessionState::Submitted
        };
        self.attempt = Some(attempt);
        self.cursor = 0;
    }

    pub(crate) fn finish(&mut self, attempt: Attempt) {
        self.state = SessionState::Submitted;
        self.attempt = Some(attempt);
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn question_set(&self) -> &QuestionSet {
        &self.set
    }

    #[must_use]
    pub fn attempt(&self) -> Option<&Attempt> {
        self.attempt.as_ref()
    }

    #[must_use]
    pub fn attempt_id(&self) -> Option<AttemptId> {
        self.attempt.as_ref().map(Attempt::id)
    }

    #[must_use]
    pub fn selected_option(&self, question_id: QuestionId) -> Option<OptionId> {
        self.attempt
            .as_ref()
            .and_then(|a| a.selected_option(question_id))
    }

    #[must_use]
    pub fn answered_count(&self) -> usize {
        self.attempt.as_ref().map_or(0, Attempt::answered_count)
    }

    #[must_use]
    pub fn total_questions(&self) -> usize {
        self.set.question_count()
    }

    /// Frozen score once submitted.
    #[must_use]
    pub fn score(&self) -> Option<&ScoreCard> {
        self.attempt.as_ref().and_then(Attempt::score)
    }

    // ─── cursor ───

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.cursor
    }

    #[must_use]
    pub fn current_question(&self) -> Option<&Question> {
        self.set.questions().get(self.cursor)
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.cursor + 1 >= self.set.question_count()
    }

    /// Moves to the next question; `false` at the end.
    pub fn next(&mut self) -> bool {
        if self.is_last_question() {
            return false;
        }
        self.cursor += 1;
        true
    }

    /// Moves to the previous question; `false` at the start.
    pub fn previous(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        true
    }

    /// Jumps to question `index`; out-of-range indices leave the cursor alone.
    pub fn go_to(&mut self, index: usize) -> bool {
        if index >= self.set.question_count() {
            return false;
        }
        self.cursor = index;
        true
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    // ─── transitions ───

    fn open_attempt_id(&self) -> Result<AttemptId, PracticeError> {
        match (self.state, &self.attempt) {
            (SessionState::InProgress, Some(attempt)) => Ok(attempt.id()),
            (SessionState::Submitted, Some(attempt)) => {
                Err(PracticeError::AlreadySubmitted(attempt.id()))
            }
            _ => Err(PracticeError::NotStarted),
        }
    }

    /// Validates a selection and stamps it with the next sequence number.
    pub(crate) fn prepare_selection(
        &mut self,
        question_id: QuestionId,
        selected: Option<OptionId>,
    ) -> Result<PendingSelection, PracticeError> {
        let attempt_id = self.open_attempt_id()?;
        let question = self
            .set
            .question(question_id)
            .ok_or(PracticeError::QuestionNotFound(question_id))?;
        if let Some(option_id) = selected {
            if !question.has_option(option_id) {
                return Err(ValidationError::OptionNotInQuestion {
                    question_id,
                    option_id,
                }
                .into());
            }
        }

        self.last_seq += 1;
        Ok(PendingSelection {
            attempt_id,
            question_id,
            selected,
            seq: self.last_seq,
        })
    }

    /// Mirrors a persisted selection into the local attempt.
    pub(crate) fn apply_selection(
        &mut self,
        pending: PendingSelection,
    ) -> Result<AnswerWrite, PracticeError> {
        let attempt = self.attempt.as_mut().ok_or(PracticeError::NotStarted)?;
        attempt
            .record_answer(pending.question_id, pending.selected, pending.seq)
            .map_err(|_| PracticeError::AlreadySubmitted(attempt.id()))
    }

    /// Id of the attempt to submit; errors unless the session is in progress.
    pub(crate) fn submittable_attempt(&self) -> Result<AttemptId, PracticeError> {
        self.open_attempt_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiz_core::model::{AnswerOption, QuestionKind, QuestionSetId, SetStatus};
    use quiz_core::time::fixed_now;

    fn set() -> QuestionSet {
        let questions = (1..=3)
            .map(|n| {
                Question::new(
                    QuestionId::new(n),
                    format!("Question {n}"),
                    QuestionKind::TrueFalse,
                    vec![
                        AnswerOption::new(OptionId::new(1), "True", true),
                        AnswerOption::new(OptionId::new(2), "False", false),
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

    fn started() -> AttemptSession {
        let mut session = AttemptSession::new(UserId::new(1), set());
        session.begin(Attempt::start(
            AttemptId::new(5),
            UserId::new(1),
            QuestionSetId::new(1),
            fixed_now(),
        ));
        session
    }

    #[test]
    fn not_started_session_rejects_selection() {
        let mut session = AttemptSession::new(UserId::new(1), set());
        assert_eq!(session.state(), SessionState::NotStarted);
        let err = session
            .prepare_selection(QuestionId::new(1), Some(OptionId::new(1)))
            .unwrap_err();
        assert!(matches!(err, PracticeError::NotStarted));
    }

    #[test]
    fn selections_get_increasing_sequence_numbers() {
        let mut session = started();
        let first = session
            .prepare_selection(QuestionId::new(1), Some(OptionId::new(1)))
            .unwrap();
        let second = session
            .prepare_selection(QuestionId::new(1), Some(OptionId::new(2)))
            .unwrap();
        assert!(second.seq > first.seq);

        assert_eq!(session.apply_selection(second).unwrap(), AnswerWrite::Applied);
        // The earlier write lands late and is ignored.
        assert_eq!(session.apply_selection(first).unwrap(), AnswerWrite::Stale);
        assert_eq!(
            session.selected_option(QuestionId::new(1)),
            Some(OptionId::new(2))
        );
    }

    #[test]
    fn resumed_session_continues_after_stored_sequence() {
        let mut attempt = Attempt::start(
            AttemptId::new(5),
            UserId::new(1),
            QuestionSetId::new(1),
            fixed_now(),
        );
        attempt
            .record_answer(QuestionId::new(2), Some(OptionId::new(1)), 41)
            .unwrap();

        let mut session = AttemptSession::new(UserId::new(1), set());
        session.begin(attempt);
        let pending = session
            .prepare_selection(QuestionId::new(2), Some(OptionId::new(2)))
            .unwrap();
        assert_eq!(pending.seq, 42);
        assert_eq!(session.answered_count(), 1);
    }

    #[test]
    fn rejects_foreign_option_and_unknown_question() {
        let mut session = started();
        let err = session
            .prepare_selection(QuestionId::new(1), Some(OptionId::new(3)))
            .unwrap_err();
        assert!(matches!(
            err,
            PracticeError::Validation(ValidationError::OptionNotInQuestion { .. })
        ));

        let err = session
            .prepare_selection(QuestionId::new(99), None)
            .unwrap_err();
        assert!(matches!(err, PracticeError::QuestionNotFound(_)));
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut session = started();
        assert!(!session.previous());
        assert!(session.next());
        assert!(session.next());
        assert!(session.is_last_question());
        assert!(!session.next());
        assert_eq!(session.current_index(), 2);

        assert!(!session.go_to(3));
        assert!(session.go_to(1));
        assert_eq!(
            session.current_question().map(Question::id),
            Some(QuestionId::new(2))
        );

        session.reset_cursor();
        assert_eq!(session.current_index(), 0);
    }
}
