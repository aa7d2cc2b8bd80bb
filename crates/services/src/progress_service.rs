use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use quiz_core::model::{AttemptId, AttemptStatus, QuestionSet, QuestionSetId};
use quiz_core::progress::{SetProgress, StudentStats, ordered_active_sets, resolve_progress};
use storage::repository::{AttemptRepository, CatalogRepository};

use crate::error::PracticeError;
use crate::identity::StudentContext;

/// Active question set paired with the student's progress on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetWithProgress {
    pub id: QuestionSetId,
    pub title: String,
    pub description: Option<String>,
    pub sort_order: i64,
    pub total_questions: usize,
    pub video_ref: Option<String>,
    pub progress: SetProgress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub stats: StudentStats,
    pub question_sets: Vec<SetWithProgress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Started,
    Completed,
}

/// One line of the student's recent activity feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityItem {
    pub attempt_id: AttemptId,
    pub kind: ActivityKind,
    pub question_set_id: QuestionSetId,
    pub title: String,
    pub score: Option<u8>,
    pub at: DateTime<Utc>,
}

impl SetWithProgress {
    fn new(set: &QuestionSet, progress: SetProgress) -> Self {
        Self {
            id: set.id(),
            title: set.title().to_owned(),
            description: set.description().map(str::to_owned),
            sort_order: set.sort_order(),
            total_questions: set.question_count(),
            video_ref: set.video_ref().map(|u| u.to_string()),
            progress,
        }
    }
}

/// Read-side queries over catalog ordering and attempt history.
#[derive(Clone)]
pub struct ProgressService {
    catalog: Arc<dyn CatalogRepository>,
    attempts: Arc<dyn AttemptRepository>,
}

impl ProgressService {
    #[must_use]
    pub fn new(catalog: Arc<dyn CatalogRepository>, attempts: Arc<dyn AttemptRepository>) -> Self {
        Self { catalog, attempts }
    }

    async fn load(
        &self,
        ctx: StudentContext,
    ) -> Result<(Vec<QuestionSet>, Vec<SetProgress>), PracticeError> {
        let sets = self.catalog.list_active_question_sets().await?;
        let attempts = self.attempts.list_attempts_for_user(ctx.user_id()).await?;
        let progress = resolve_progress(&sets, &attempts);
        Ok((sets, progress))
    }

    /// Per-set progress in student-facing order.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on backend failures.
    pub async fn progress(&self, ctx: StudentContext) -> Result<Vec<SetProgress>, PracticeError> {
        let (_, progress) = self.load(ctx).await?;
        Ok(progress)
    }

    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on backend failures.
    pub async fn stats(&self, ctx: StudentContext) -> Result<StudentStats, PracticeError> {
        let (_, progress) = self.load(ctx).await?;
        Ok(StudentStats::from_progress(&progress))
    }

    /// Stats plus every active set with its progress.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on backend failures.
    pub async fn dashboard(&self, ctx: StudentContext) -> Result<Dashboard, PracticeError> {
        let (sets, progress) = self.load(ctx).await?;
        let stats = StudentStats::from_progress(&progress);

        let mut by_set: HashMap<QuestionSetId, SetProgress> = progress
            .into_iter()
            .map(|p| (p.question_set_id, p))
            .collect();

        let question_sets = ordered_active_sets(&sets)
            .into_iter()
            .filter_map(|set| {
                let progress = by_set.remove(&set.id())?;
                Some(SetWithProgress::new(set, progress))
            })
            .collect();

        Ok(Dashboard {
            stats,
            question_sets,
        })
    }

    /// One active set with the student's progress on it, for a detail page.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::QuestionSetNotFound` for unknown and draft sets,
    /// or `PracticeError::Storage` on backend failures.
    pub async fn question_set(
        &self,
        ctx: StudentContext,
        question_set_id: QuestionSetId,
    ) -> Result<SetWithProgress, PracticeError> {
        let (sets, progress) = self.load(ctx).await?;
        let set = sets.iter().find(|s| s.id() == question_set_id);
        let progress = progress
            .into_iter()
            .find(|p| p.question_set_id == question_set_id);

        match (set, progress) {
            (Some(set), Some(progress)) => Ok(SetWithProgress::new(set, progress)),
            _ => Err(PracticeError::QuestionSetNotFound(question_set_id)),
        }
    }

    /// Most recent starts and submissions, newest first.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::Storage` on backend failures.
    pub async fn recent_activity(
        &self,
        ctx: StudentContext,
        limit: usize,
    ) -> Result<Vec<ActivityItem>, PracticeError> {
        let sets = self.catalog.list_active_question_sets().await?;
        let titles: HashMap<QuestionSetId, &str> =
            sets.iter().map(|s| (s.id(), s.title())).collect();
        let attempts = self.attempts.list_attempts_for_user(ctx.user_id()).await?;

        let mut items: Vec<ActivityItem> = attempts
            .iter()
            .filter_map(|attempt| {
                let title = titles.get(&attempt.question_set_id())?;
                let (kind, at) = match (attempt.status(), attempt.submitted_at()) {
                    (AttemptStatus::Submitted, Some(at)) => (ActivityKind::Completed, at),
                    _ => (ActivityKind::Started, attempt.started_at()),
                };
                Some(ActivityItem {
                    attempt_id: attempt.id(),
                    kind,
                    question_set_id: attempt.question_set_id(),
                    title: (*title).to_owned(),
                    score: attempt.score().map(|s| s.percentage()),
                    at,
                })
            })
            .collect();

        items.sort_by(|a, b| b.at.cmp(&a.at).then(b.attempt_id.cmp(&a.attempt_id)));
        items.truncate(limit);
        Ok(items)
    }
}
