use std::sync::Arc;

use quiz_core::model::{AttemptId, QuestionSetId};
use quiz_core::progress::resolve_progress;
use quiz_core::result::{QuizResult, project_result};
use storage::repository::{AttemptRepository, CatalogRepository};
use tracing::debug;

use crate::error::PracticeError;
use crate::identity::StudentContext;

/// Serves reviewable results for submitted attempts.
#[derive(Clone)]
pub struct ResultService {
    catalog: Arc<dyn CatalogRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl ResultService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { catalog, attempts }
    }

    /// Result of one of the student's submitted attempts.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::AttemptNotFound` when the attempt does not exist,
    /// is still open, or belongs to another student.
    pub async fn result(
        &self,
        ctx: StudentContext,
        attempt_id: AttemptId,
    ) -> Result<QuizResult, PracticeError> {
        let Some(attempt) = self
            .attempts
            .get_attempt(attempt_id)
            .await?
            .filter(|a| a.user_id() == ctx.user_id() && !a.is_open())
        else {
            debug!(user_id = %ctx.user_id(), %attempt_id, "result not available");
            return Err(PracticeError::AttemptNotFound(attempt_id));
        };

        let set_id = attempt.question_set_id();
        let set = self
            .catalog
            .get_question_set(set_id)
            .await?
            .ok_or(PracticeError::QuestionSetNotFound(set_id))?;

        Ok(project_result(&attempt, &set)?)
    }

    /// Result of the most recent submission for a question set.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::NotCompleted` when the set has no submission.
    pub async fn latest_result(
        &self,
        ctx: StudentContext,
        question_set_id: QuestionSetId,
    ) -> Result<QuizResult, PracticeError> {
        let sets = self.catalog.list_active_question_sets().await?;
        let attempts = self.attempts.list_attempts_for_user(ctx.user_id()).await?;

        let progress = resolve_progress(&sets, &attempts)
            .into_iter()
            .find(|p| p.question_set_id == question_set_id)
            .ok_or(PracticeError::QuestionSetNotFound(question_set_id))?;
        let attempt_id = match (progress.completed_at, progress.attempt_id) {
            (Some(_), Some(id)) => id,
            _ => return Err(PracticeError::NotCompleted(question_set_id)),
        };
        self.result(ctx, attempt_id).await
    }
}
