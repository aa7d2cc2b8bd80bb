use std::sync::Arc;

use quiz_core::model::{
    AnswerWrite, Attempt, AttemptId, OptionId, QuestionId, QuestionSet, QuestionSetId,
};
use quiz_core::progress::{ProgressStatus, SetProgress, resolve_progress};
use quiz_core::scoring::{PassPolicy, ScoreCard, ScoringError, grade_attempt};
use storage::repository::{
    AnswerUpsert, AttemptRepository, CatalogRepository, NewAttempt, StorageError,
};
use tracing::{debug, info, warn};

use super::session::{AttemptSession, PendingSelection};
use crate::Clock;
use crate::error::{PracticeError, ValidationError};
use crate::identity::StudentContext;

/// One entry of a batched draft save. `None` clears the question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DraftAnswer {
    pub question_id: QuestionId,
    pub selected: Option<OptionId>,
}

/// Drives attempt sessions against the catalog and the attempt store.
#[derive(Clone)]
pub struct PracticeService {
    clock: Clock,
    catalog: Arc<dyn CatalogRepository>,
    attempts: Arc<dyn AttemptRepository>,
    policy: PassPolicy,
}

impl PracticeService {
    #[must_use]
    pub fn new(
        clock: Clock,
        catalog: Arc<dyn CatalogRepository>,
        attempts: Arc<dyn AttemptRepository>,
    ) -> Self {
        Self {
            clock,
            catalog,
            attempts,
            policy: PassPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_pass_policy(mut self, policy: PassPolicy) -> Self {
        self.policy = policy;
        self
    }

    #[must_use]
    pub fn pass_policy(&self) -> PassPolicy {
        self.policy
    }

    /// Loads an active set together with the student's resolved progress for it.
    async fn load_with_progress(
        &self,
        ctx: StudentContext,
        question_set_id: QuestionSetId,
    ) -> Result<(QuestionSet, SetProgress), PracticeError> {
        let sets = self.catalog.list_active_question_sets().await?;
        let attempts = self.attempts.list_attempts_for_user(ctx.user_id()).await?;

        let progress = resolve_progress(&sets, &attempts)
            .into_iter()
            .find(|p| p.question_set_id == question_set_id)
            .ok_or(PracticeError::QuestionSetNotFound(question_set_id))?;
        let set = sets
            .into_iter()
            .find(|s| s.id() == question_set_id)
            .ok_or(PracticeError::QuestionSetNotFound(question_set_id))?;

        if set.question_count() == 0 {
            return Err(ValidationError::EmptyQuestionSet(question_set_id).into());
        }
        Ok((set, progress))
    }

    async fn resume(
        &self,
        ctx: StudentContext,
        set: QuestionSet,
        attempt_id: AttemptId,
    ) -> Result<AttemptSession, PracticeError> {
        let attempt = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .filter(|a| a.user_id() == ctx.user_id())
            .ok_or(PracticeError::AttemptNotFound(attempt_id))?;
        info!(
            user_id = %ctx.user_id(),
            question_set_id = %set.id(),
            %attempt_id,
            answered = attempt.answered_count(),
            "resumed attempt"
        );
        Ok(session_for(ctx, set, attempt))
    }

    async fn start_new(
        &self,
        ctx: StudentContext,
        set: QuestionSet,
    ) -> Result<AttemptSession, PracticeError> {
        let new = NewAttempt {
            user_id: ctx.user_id(),
            question_set_id: set.id(),
            started_at: self.clock.now(),
        };
        match self.attempts.create_attempt(new).await {
            Ok(attempt) => {
                info!(
                    user_id = %ctx.user_id(),
                    question_set_id = %set.id(),
                    attempt_id = %attempt.id(),
                    "started attempt"
                );
                Ok(session_for(ctx, set, attempt))
            }
            // Another session opened one between our read and the insert.
            Err(StorageError::Conflict) => {
                let open = self
                    .attempts
                    .find_open_attempt(ctx.user_id(), set.id())
                    .await?
                    .ok_or(StorageError::Conflict)?;
                self.resume(ctx, set, open.id()).await
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Enter practice for a question set.
    ///
    /// Resumes the open attempt with its saved answers, or opens a new one.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::SetLocked` when the previous set is not completed,
    /// `PracticeError::AlreadyCompleted` when the set was submitted and no retry
    /// is open, `PracticeError::QuestionSetNotFound` for unknown or draft sets,
    /// and `ValidationError::EmptyQuestionSet` for sets without questions.
    pub async fn enter_practice(
        &self,
        ctx: StudentContext,
        question_set_id: QuestionSetId,
    ) -> Result<AttemptSession, PracticeError> {
        let (set, progress) = self.load_with_progress(ctx, question_set_id).await?;

        if let Some(open) = progress.open_attempt_id {
            return self.resume(ctx, set, open).await;
        }
        match progress.status {
            ProgressStatus::Locked => {
                debug!(user_id = %ctx.user_id(), %question_set_id, "set is locked");
                Err(PracticeError::SetLocked(question_set_id))
            }
            ProgressStatus::Completed => Err(PracticeError::AlreadyCompleted {
                question_set_id,
                attempt_id: progress.attempt_id,
            }),
            ProgressStatus::Available | ProgressStatus::InProgress => {
                self.start_new(ctx, set).await
            }
        }
    }

    /// Start another attempt at a completed set. The submitted attempts stay
    /// available for review; an already open retry is resumed.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotCompleted` when the set was never submitted.
    pub async fn retry(
        &self,
        ctx: StudentContext,
        question_set_id: QuestionSetId,
    ) -> Result<AttemptSession, PracticeError> {
        let (set, progress) = self.load_with_progress(ctx, question_set_id).await?;

        if progress.status != ProgressStatus::Completed {
            return Err(PracticeError::NotCompleted(question_set_id));
        }
        if let Some(open) = progress.open_attempt_id {
            return self.resume(ctx, set, open).await;
        }
        info!(
            user_id = %ctx.user_id(),
            %question_set_id,
            previous_attempt_id = ?progress.attempt_id,
            "retrying completed set"
        );
        self.start_new(ctx, set).await
    }

    async fn write_answer(
        &self,
        ctx: StudentContext,
        session: &mut AttemptSession,
        question_id: QuestionId,
        selected: Option<OptionId>,
    ) -> Result<AnswerWrite, PracticeError> {
        ensure_owner(ctx, session)?;
        let pending = session.prepare_selection(question_id, selected)?;
        let outcome = self.persist(pending).await?;
        match outcome {
            AnswerWrite::Applied => {
                session.apply_selection(pending)?;
                debug!(
                    attempt_id = %pending.attempt_id,
                    %question_id,
                    seq = pending.seq,
                    cleared = selected.is_none(),
                    "recorded answer"
                );
            }
            // The store holds a newer write, so the mirror is left alone too.
            AnswerWrite::Stale => warn!(
                attempt_id = %pending.attempt_id,
                %question_id,
                seq = pending.seq,
                "stale answer write ignored by store"
            ),
        }
        Ok(outcome)
    }

    async fn persist(&self, pending: PendingSelection) -> Result<AnswerWrite, PracticeError> {
        let upsert = AnswerUpsert {
            question_id: pending.question_id,
            selected: pending.selected,
            seq: pending.seq,
            answered_at: self.clock.now(),
        };
        self.attempts
            .upsert_answer(pending.attempt_id, &upsert)
            .await
            .map_err(|e| match e {
                StorageError::NotFound => PracticeError::AttemptNotFound(pending.attempt_id),
                StorageError::Conflict => PracticeError::AlreadySubmitted(pending.attempt_id),
                other => other.into(),
            })
    }

    /// Record the student's choice for a question, replacing any earlier one.
    ///
    /// The selection is persisted before this returns.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotStarted` before practice is entered,
    /// `PracticeError::AlreadySubmitted` after submission,
    /// `PracticeError::QuestionNotFound` for questions outside the set, and
    /// `ValidationError::OptionNotInQuestion` for foreign options.
    pub async fn select_answer(
        &self,
        ctx: StudentContext,
        session: &mut AttemptSession,
        question_id: QuestionId,
        option_id: OptionId,
    ) -> Result<AnswerWrite, PracticeError> {
        self.write_answer(ctx, session, question_id, Some(option_id))
            .await
    }

    /// Reset a question to unanswered.
    ///
    /// # Errors
    ///
    /// Same as [`PracticeService::select_answer`].
    pub async fn clear_answer(
        &self,
        ctx: StudentContext,
        session: &mut AttemptSession,
        question_id: QuestionId,
    ) -> Result<AnswerWrite, PracticeError> {
        self.write_answer(ctx, session, question_id, None).await
    }

    /// Persist a batch of selections in order. Returns how many were applied.
    ///
    /// # Errors
    ///
    /// Stops at the first failing entry; earlier entries stay persisted.
    pub async fn save_draft(
        &self,
        ctx: StudentContext,
        session: &mut AttemptSession,
        answers: &[DraftAnswer],
    ) -> Result<usize, PracticeError> {
        let mut applied = 0;
        for answer in answers {
            let outcome = self
                .write_answer(ctx, session, answer.question_id, answer.selected)
                .await?;
            if outcome == AnswerWrite::Applied {
                applied += 1;
            }
        }
        debug!(
            attempt_id = ?session.attempt_id(),
            applied,
            total = answers.len(),
            "saved draft"
        );
        Ok(applied)
    }

    /// Close the attempt and freeze its score.
    ///
    /// Unanswered questions count as incorrect. The score is computed from the
    /// answers held by the store, not the session mirror.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotStarted` before practice is entered and
    /// `PracticeError::AlreadySubmitted` on a second submission; the stored
    /// score is left untouched in that case.
    pub async fn submit(
        &self,
        ctx: StudentContext,
        session: &mut AttemptSession,
    ) -> Result<ScoreCard, PracticeError> {
        ensure_owner(ctx, session)?;
        let attempt_id = session.submittable_attempt()?;

        let stored = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .ok_or(PracticeError::AttemptNotFound(attempt_id))?;
        if !stored.is_open() {
            return Err(PracticeError::AlreadySubmitted(attempt_id));
        }

        let set = match self.catalog.get_question_set(stored.question_set_id()).await? {
            Some(set) => set,
            None => session.question_set().clone(),
        };
        let grading = grade_attempt(&set, &stored, self.policy).map_err(|e| match e {
            ScoringError::EmptyQuestionSet => {
                PracticeError::from(ValidationError::EmptyQuestionSet(set.id()))
            }
            other => other.into(),
        })?;
        let card = *grading.card();

        let submitted = self
            .attempts
            .submit_attempt(attempt_id, &grading, self.clock.now())
            .await
            .map_err(|e| match e {
                StorageError::Conflict => PracticeError::AlreadySubmitted(attempt_id),
                StorageError::NotFound => PracticeError::AttemptNotFound(attempt_id),
                other => other.into(),
            })?;

        info!(
            user_id = %ctx.user_id(),
            question_set_id = %submitted.question_set_id(),
            %attempt_id,
            correct = card.correct(),
            total = card.total_questions(),
            percentage = card.percentage(),
            passed = card.passed(),
            "submitted attempt"
        );
        session.finish(submitted);
        Ok(card)
    }
}

fn session_for(ctx: StudentContext, set: QuestionSet, attempt: Attempt) -> AttemptSession {
    let mut session = AttemptSession::new(ctx.user_id(), set);
    session.begin(attempt);
    session
}

fn ensure_owner(ctx: StudentContext, session: &AttemptSession) -> Result<(), PracticeError> {
    if session.user_id() == ctx.user_id() {
        return Ok(());
    }
    match session.attempt_id() {
        Some(id) => Err(PracticeError::AttemptNotFound(id)),
        None => Err(PracticeError::NotStarted),
    }
}
