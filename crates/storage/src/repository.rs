use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quiz_core::model::{
    AnswerWrite, Attempt, AttemptError, AttemptId, OptionId, QuestionId, QuestionSet,
    QuestionSetId, UserId,
};
use quiz_core::progress::ordered_active_sets;
use quiz_core::scoring::Grading;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<AttemptError> for StorageError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::AlreadySubmitted { .. } => StorageError::Conflict,
            other => StorageError::Serialization(other.to_string()),
        }
    }
}

/// Insert shape for a new attempt; the store assigns the id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewAttempt {
    pub user_id: UserId,
    pub question_set_id: QuestionSetId,
    pub started_at: DateTime<Utc>,
}

/// One sequenced answer write.
///
/// `seq` must increase monotonically per attempt; the store keeps, per
/// question, the write with the highest `seq` it has seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerUpsert {
    pub question_id: QuestionId,
    pub selected: Option<OptionId>,
    pub seq: u64,
    pub answered_at: DateTime<Utc>,
}

/// Catalog provider: question sets with nested questions and options.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Persist or replace a question set, including its questions and options.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the set cannot be stored.
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError>;

    /// Fetch a question set by ID, draft or active.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_question_set(&self, id: QuestionSetId)
    -> Result<Option<QuestionSet>, StorageError>;

    /// Active sets ordered by `sort_order`, then id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_active_question_sets(&self) -> Result<Vec<QuestionSet>, StorageError>;
}

/// Durable attempt and answer persistence.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Open a new attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already has an open attempt
    /// for the question set.
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError>;

    /// The user's open attempt for a question set, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn find_open_attempt(
        &self,
        user_id: UserId,
        question_set_id: QuestionSetId,
    ) -> Result<Option<Attempt>, StorageError>;

    /// Every attempt the user has made, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on backend failures.
    async fn list_attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError>;

    /// Upsert one answer, ignoring writes older than the stored one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown attempts and
    /// `StorageError::Conflict` once the attempt is submitted.
    async fn upsert_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AnswerUpsert,
    ) -> Result<AnswerWrite, StorageError>;

    /// Close an open attempt, freezing its score and per-question review.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` for unknown attempts and
    /// `StorageError::Conflict` if the attempt is already submitted.
    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        grading: &Grading,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError>;
}

//
// ─── IN-MEMORY ─────────────────────────────────────────────────────────────────
//

#[derive(Default)]
struct AttemptTable {
    next_id: u64,
    rows: BTreeMap<AttemptId, Attempt>,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    sets: Arc<Mutex<HashMap<QuestionSetId, QuestionSet>>>,
    attempts: Arc<Mutex<AttemptTable>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogRepository for InMemoryRepository {
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError> {
        let mut guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(set.id(), set.clone());
        Ok(())
    }

    async fn get_question_set(
        &self,
        id: QuestionSetId,
    ) -> Result<Option<QuestionSet>, StorageError> {
        let guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(&id).cloned())
    }

    async fn list_active_question_sets(&self) -> Result<Vec<QuestionSet>, StorageError> {
        let guard = self
            .sets
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let all: Vec<QuestionSet> = guard.values().cloned().collect();
        Ok(ordered_active_sets(&all).into_iter().cloned().collect())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        let clash = guard.rows.values().any(|a| {
            a.is_open()
                && a.user_id() == attempt.user_id
                && a.question_set_id() == attempt.question_set_id
        });
        if clash {
            return Err(StorageError::Conflict);
        }

        guard.next_id += 1;
        let created = Attempt::start(
            AttemptId::new(guard.next_id),
            attempt.user_id,
            attempt.question_set_id,
            attempt.started_at,
        );
        guard.rows.insert(created.id(), created.clone());
        Ok(created)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.rows.get(&id).cloned())
    }

    async fn find_open_attempt(
        &self,
        user_id: UserId,
        question_set_id: QuestionSetId,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .rows
            .values()
            .find(|a| {
                a.is_open() && a.user_id() == user_id && a.question_set_id() == question_set_id
            })
            .cloned())
    }

    async fn list_attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .rows
            .values()
            .filter(|a| a.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn upsert_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AnswerUpsert,
    ) -> Result<AnswerWrite, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let attempt = guard
            .rows
            .get_mut(&attempt_id)
            .ok_or(StorageError::NotFound)?;
        Ok(attempt.record_answer(answer.question_id, answer.selected, answer.seq)?)
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        grading: &Grading,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let attempt = guard
            .rows
            .get_mut(&attempt_id)
            .ok_or(StorageError::NotFound)?;
        attempt.submit(grading.clone(), submitted_at)?;
        Ok(attempt.clone())
    }
}

/// Aggregates catalog and attempt repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub catalog: Arc<dyn CatalogRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let catalog: Arc<dyn CatalogRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo);
        Self { catalog, attempts }
    }
}
