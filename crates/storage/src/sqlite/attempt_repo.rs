use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use quiz_core::model::{AnswerWrite, Attempt, AttemptId, QuestionId, QuestionSetId, UserId};
use quiz_core::scoring::{Grading, QuestionReview, ReviewOption};
use sqlx::Row;
use tracing::{debug, info};

use super::SqliteRepository;
use super::mapping::{
    attempt_id_from_i64, conn, id_i64, map_answer_row, map_attempt_row, map_review_option_row,
    map_review_row, ser,
};
use crate::repository::{AnswerUpsert, AttemptRepository, NewAttempt, StorageError};

const ATTEMPT_COLUMNS: &str = r"
    id, user_id, question_set_id, status, started_at, submitted_at,
    correct_count, total_questions, percentage, passed
";

/// Which attempts to load review lines for.
#[derive(Debug, Clone, Copy)]
enum ReviewScope {
    Attempt(i64),
    User(i64),
}

impl ReviewScope {
    fn filter(self) -> (&'static str, i64) {
        match self {
            ReviewScope::Attempt(id) => ("r.attempt_id = ?1", id),
            ReviewScope::User(id) => (
                "r.attempt_id IN (SELECT id FROM attempts WHERE user_id = ?1)",
                id,
            ),
        }
    }
}

impl SqliteRepository {
    async fn load_reviews(
        &self,
        scope: ReviewScope,
    ) -> Result<HashMap<AttemptId, Vec<QuestionReview>>, StorageError> {
        let (filter, bind) = scope.filter();

        let option_sql = format!(
            r"
                SELECT r.attempt_id, r.question_id, r.option_id, r.text, r.is_correct
                FROM attempt_review_options r
                WHERE {filter}
                ORDER BY r.attempt_id ASC, r.question_id ASC, r.position ASC
            "
        );
        let option_rows = sqlx::query(&option_sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut options: HashMap<(AttemptId, QuestionId), Vec<ReviewOption>> = HashMap::new();
        for row in &option_rows {
            let (attempt_id, question_id, option) = map_review_option_row(row)?;
            options
                .entry((attempt_id, question_id))
                .or_default()
                .push(option);
        }

        let question_sql = format!(
            r"
                SELECT r.attempt_id, r.question_id, r.question_text, r.kind,
                       r.selected_option_id, r.correct_option_id, r.is_correct
                FROM attempt_review r
                WHERE {filter}
                ORDER BY r.attempt_id ASC, r.position ASC
            "
        );
        let question_rows = sqlx::query(&question_sql)
            .bind(bind)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut reviews: HashMap<AttemptId, Vec<QuestionReview>> = HashMap::new();
        for row in &question_rows {
            let (attempt_id, mut line) = map_review_row(row)?;
            line.options = options
                .remove(&(attempt_id, line.question_id))
                .unwrap_or_default();
            reviews.entry(attempt_id).or_default().push(line);
        }
        Ok(reviews)
    }

    async fn load_attempt(&self, attempt_id: i64) -> Result<Option<Attempt>, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM attempts WHERE id = ?1");
        let Some(row) = sqlx::query(&sql)
            .bind(attempt_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?
        else {
            return Ok(None);
        };

        let answer_rows = sqlx::query(
            r"
                SELECT attempt_id, question_id, selected_option_id, seq
                FROM attempt_answers
                WHERE attempt_id = ?1
            ",
        )
        .bind(attempt_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut answers = BTreeMap::new();
        for answer_row in &answer_rows {
            let (_, question_id, answer) = map_answer_row(answer_row)?;
            answers.insert(question_id, answer);
        }

        let review = self
            .load_reviews(ReviewScope::Attempt(attempt_id))
            .await?
            .remove(&attempt_id_from_i64(attempt_id)?)
            .unwrap_or_default();

        map_attempt_row(&row, answers, review).map(Some)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn create_attempt(&self, attempt: NewAttempt) -> Result<Attempt, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO attempts (user_id, question_set_id, status, started_at)
                VALUES (?1, ?2, 'in_progress', ?3)
            ",
        )
        .bind(id_i64("user_id", attempt.user_id.value())?)
        .bind(id_i64("question_set_id", attempt.question_set_id.value())?)
        .bind(attempt.started_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StorageError::Conflict
            } else {
                conn(e)
            }
        })?;

        let id = res.last_insert_rowid();
        info!(
            attempt_id = id,
            user_id = %attempt.user_id,
            question_set_id = %attempt.question_set_id,
            "created attempt"
        );
        self.load_attempt(id).await?.ok_or(StorageError::NotFound)
    }

    async fn get_attempt(&self, id: AttemptId) -> Result<Option<Attempt>, StorageError> {
        self.load_attempt(id_i64("attempt_id", id.value())?).await
    }

    async fn find_open_attempt(
        &self,
        user_id: UserId,
        question_set_id: QuestionSetId,
    ) -> Result<Option<Attempt>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id FROM attempts
                WHERE user_id = ?1 AND question_set_id = ?2 AND status = 'in_progress'
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .bind(id_i64("question_set_id", question_set_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => self.load_attempt(row.try_get("id").map_err(ser)?).await,
            None => Ok(None),
        }
    }

    async fn list_attempts_for_user(&self, user_id: UserId) -> Result<Vec<Attempt>, StorageError> {
        let user = id_i64("user_id", user_id.value())?;

        let answer_rows = sqlx::query(
            r"
                SELECT a.attempt_id, a.question_id, a.selected_option_id, a.seq
                FROM attempt_answers a
                JOIN attempts t ON t.id = a.attempt_id
                WHERE t.user_id = ?1
            ",
        )
        .bind(user)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut answers: HashMap<AttemptId, BTreeMap<_, _>> = HashMap::new();
        for row in &answer_rows {
            let (attempt_id, question_id, answer) = map_answer_row(row)?;
            answers
                .entry(attempt_id)
                .or_default()
                .insert(question_id, answer);
        }

        let mut reviews = self.load_reviews(ReviewScope::User(user)).await?;

        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM attempts \
             WHERE user_id = ?1 ORDER BY started_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(user)
            .fetch_all(&self.pool)
            .await
            .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            let id = attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let attempt_answers = answers.remove(&id).unwrap_or_default();
            let review = reviews.remove(&id).unwrap_or_default();
            out.push(map_attempt_row(row, attempt_answers, review)?);
        }
        Ok(out)
    }

    async fn upsert_answer(
        &self,
        attempt_id: AttemptId,
        answer: &AnswerUpsert,
    ) -> Result<AnswerWrite, StorageError> {
        let id = id_i64("attempt_id", attempt_id.value())?;
        let seq = id_i64("seq", answer.seq)?;
        let selected = answer
            .selected
            .map(|o| id_i64("option_id", o.value()))
            .transpose()?;

        let mut tx = self.pool.begin().await.map_err(conn)?;

        let status: Option<String> = sqlx::query_scalar("SELECT status FROM attempts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(conn)?;
        match status.as_deref() {
            None => return Err(StorageError::NotFound),
            Some("in_progress") => {}
            Some(_) => return Err(StorageError::Conflict),
        }

        // Writes older than the stored one leave the row untouched.
        let res = sqlx::query(
            r"
                INSERT INTO attempt_answers
                    (attempt_id, question_id, selected_option_id, seq, answered_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(attempt_id, question_id) DO UPDATE SET
                    selected_option_id = excluded.selected_option_id,
                    seq = excluded.seq,
                    answered_at = excluded.answered_at
                WHERE excluded.seq > attempt_answers.seq
            ",
        )
        .bind(id)
        .bind(id_i64("question_id", answer.question_id.value())?)
        .bind(selected)
        .bind(seq)
        .bind(answer.answered_at)
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        tx.commit().await.map_err(conn)?;

        let outcome = if res.rows_affected() == 0 {
            AnswerWrite::Stale
        } else {
            AnswerWrite::Applied
        };
        debug!(
            %attempt_id,
            question_id = %answer.question_id,
            seq = answer.seq,
            ?outcome,
            "upserted answer"
        );
        Ok(outcome)
    }

    async fn submit_attempt(
        &self,
        attempt_id: AttemptId,
        grading: &Grading,
        submitted_at: DateTime<Utc>,
    ) -> Result<Attempt, StorageError> {
        let id = id_i64("attempt_id", attempt_id.value())?;
        let score = grading.card();
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let res = sqlx::query(
            r"
                UPDATE attempts SET
                    status = 'submitted',
                    submitted_at = ?2,
                    correct_count = ?3,
                    total_questions = ?4,
                    percentage = ?5,
                    passed = ?6
                WHERE id = ?1 AND status = 'in_progress'
            ",
        )
        .bind(id)
        .bind(submitted_at)
        .bind(i64::from(score.correct()))
        .bind(i64::from(score.total_questions()))
        .bind(i64::from(score.percentage()))
        .bind(i64::from(score.passed()))
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        if res.rows_affected() == 0 {
            tx.rollback().await.map_err(conn)?;
            return match self.load_attempt(id).await? {
                Some(_) => Err(StorageError::Conflict),
                None => Err(StorageError::NotFound),
            };
        }

        for (q_pos, line) in grading.review().iter().enumerate() {
            let question_id = id_i64("question_id", line.question_id.value())?;
            sqlx::query(
                r"
                    INSERT INTO attempt_review
                        (attempt_id, question_id, position, question_text, kind,
                         selected_option_id, correct_option_id, is_correct)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ",
            )
            .bind(id)
            .bind(question_id)
            .bind(i64::try_from(q_pos).map_err(ser)?)
            .bind(line.question_text.as_str())
            .bind(line.kind.as_str())
            .bind(
                line.selected_option_id
                    .map(|o| id_i64("option_id", o.value()))
                    .transpose()?,
            )
            .bind(id_i64("option_id", line.correct_option_id.value())?)
            .bind(i64::from(line.is_correct))
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (o_pos, option) in line.options.iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO attempt_review_options
                            (attempt_id, question_id, option_id, position, text, is_correct)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(id)
                .bind(question_id)
                .bind(id_i64("option_id", option.id.value())?)
                .bind(i64::try_from(o_pos).map_err(ser)?)
                .bind(option.text.as_str())
                .bind(i64::from(option.is_correct))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;

        info!(
            %attempt_id,
            percentage = score.percentage(),
            passed = score.passed(),
            "submitted attempt"
        );
        self.load_attempt(id).await?.ok_or(StorageError::NotFound)
    }
}
