use std::collections::HashMap;

use quiz_core::model::{
    AnswerOption, Question, QuestionId, QuestionKind, QuestionSet, QuestionSetId, SetStatus,
};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::debug;

use super::SqliteRepository;
use super::mapping::{
    conn, id_i64, option_id_from_i64, question_id_from_i64, ser, set_id_from_i64,
};
use crate::repository::{CatalogRepository, StorageError};

impl SqliteRepository {
    async fn load_questions(&self, set_id: i64) -> Result<Vec<Question>, StorageError> {
        let option_rows = sqlx::query(
            r"
                SELECT question_id, id, text, is_correct
                FROM question_options
                WHERE question_set_id = ?1
                ORDER BY question_id ASC, position ASC
            ",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut options: HashMap<QuestionId, Vec<AnswerOption>> = HashMap::new();
        for row in option_rows {
            let question_id =
                question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
            let option = AnswerOption::new(
                option_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
                row.try_get::<String, _>("text").map_err(ser)?,
                row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
            );
            options.entry(question_id).or_default().push(option);
        }

        let question_rows = sqlx::query(
            r"
                SELECT id, text, kind
                FROM questions
                WHERE question_set_id = ?1
                ORDER BY position ASC, id ASC
            ",
        )
        .bind(set_id)
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut questions = Vec::with_capacity(question_rows.len());
        for row in question_rows {
            let id = question_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?;
            let kind_str: String = row.try_get("kind").map_err(ser)?;
            let question = Question::new(
                id,
                row.try_get::<String, _>("text").map_err(ser)?,
                QuestionKind::parse(&kind_str).map_err(ser)?,
                options.remove(&id).unwrap_or_default(),
            )
            .map_err(ser)?;
            questions.push(question);
        }
        Ok(questions)
    }

    async fn map_set_row(&self, row: &SqliteRow) -> Result<QuestionSet, StorageError> {
        let raw_id: i64 = row.try_get("id").map_err(ser)?;
        let status_str: String = row.try_get("status").map_err(ser)?;
        let video_ref: Option<String> = row.try_get("video_ref").map_err(ser)?;
        let questions = self.load_questions(raw_id).await?;

        QuestionSet::new(
            set_id_from_i64(raw_id)?,
            row.try_get::<String, _>("title").map_err(ser)?,
            row.try_get::<Option<String>, _>("description").map_err(ser)?,
            row.try_get::<i64, _>("sort_order").map_err(ser)?,
            video_ref.as_deref(),
            SetStatus::parse(&status_str).map_err(ser)?,
            questions,
        )
        .map_err(ser)
    }
}

#[async_trait::async_trait]
impl CatalogRepository for SqliteRepository {
    async fn upsert_question_set(&self, set: &QuestionSet) -> Result<(), StorageError> {
        let set_id = id_i64("question_set_id", set.id().value())?;
        let mut tx = self.pool.begin().await.map_err(conn)?;

        sqlx::query(
            r"
                INSERT INTO question_sets (id, title, description, sort_order, video_ref, status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(id) DO UPDATE SET
                    title = excluded.title,
                    description = excluded.description,
                    sort_order = excluded.sort_order,
                    video_ref = excluded.video_ref,
                    status = excluded.status
            ",
        )
        .bind(set_id)
        .bind(set.title())
        .bind(set.description())
        .bind(set.sort_order())
        .bind(set.video_ref().map(|u| u.as_str()))
        .bind(set.status().as_str())
        .execute(&mut *tx)
        .await
        .map_err(conn)?;

        // Options cascade with their questions.
        sqlx::query("DELETE FROM questions WHERE question_set_id = ?1")
            .bind(set_id)
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

        for (q_pos, question) in set.questions().iter().enumerate() {
            let question_id = id_i64("question_id", question.id().value())?;
            sqlx::query(
                r"
                    INSERT INTO questions (question_set_id, id, position, text, kind)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
            )
            .bind(set_id)
            .bind(question_id)
            .bind(i64::try_from(q_pos).map_err(ser)?)
            .bind(question.text())
            .bind(question.kind().as_str())
            .execute(&mut *tx)
            .await
            .map_err(conn)?;

            for (o_pos, option) in question.options().iter().enumerate() {
                sqlx::query(
                    r"
                        INSERT INTO question_options
                            (question_set_id, question_id, id, position, text, is_correct)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(set_id)
                .bind(question_id)
                .bind(id_i64("option_id", option.id().value())?)
                .bind(i64::try_from(o_pos).map_err(ser)?)
                .bind(option.text())
                .bind(i64::from(option.is_correct()))
                .execute(&mut *tx)
                .await
                .map_err(conn)?;
            }
        }

        tx.commit().await.map_err(conn)?;
        debug!(
            question_set_id = %set.id(),
            questions = set.question_count(),
            "stored question set"
        );
        Ok(())
    }

    async fn get_question_set(
        &self,
        id: QuestionSetId,
    ) -> Result<Option<QuestionSet>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, title, description, sort_order, video_ref, status
                FROM question_sets
                WHERE id = ?1
            ",
        )
        .bind(id_i64("question_set_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        match row {
            Some(row) => Ok(Some(self.map_set_row(&row).await?)),
            None => Ok(None),
        }
    }

    async fn list_active_question_sets(&self) -> Result<Vec<QuestionSet>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, title, description, sort_order, video_ref, status
                FROM question_sets
                WHERE status = 'active'
                ORDER BY sort_order ASC, id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(self.map_set_row(row).await?);
        }
        Ok(out)
    }
}
