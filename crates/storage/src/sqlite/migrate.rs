use chrono::Utc;
use sqlx::SqlitePool;
use tracing::info;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS question_sets (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            sort_order INTEGER NOT NULL,
            video_ref TEXT,
            status TEXT NOT NULL CHECK (status IN ('draft', 'active'))
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS questions (
            question_set_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            text TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('multiple_choice', 'true_false')),
            PRIMARY KEY (question_set_id, id),
            FOREIGN KEY (question_set_id) REFERENCES question_sets(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS question_options (
            question_set_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            text TEXT NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            PRIMARY KEY (question_set_id, question_id, id),
            FOREIGN KEY (question_set_id, question_id)
                REFERENCES questions(question_set_id, id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            question_set_id INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('in_progress', 'submitted')),
            started_at TEXT NOT NULL,
            submitted_at TEXT,
            correct_count INTEGER CHECK (correct_count >= 0),
            total_questions INTEGER CHECK (total_questions > 0),
            percentage INTEGER CHECK (percentage BETWEEN 0 AND 100),
            passed INTEGER CHECK (passed IN (0, 1)),
            FOREIGN KEY (question_set_id) REFERENCES question_sets(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempt_answers (
            attempt_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            selected_option_id INTEGER,
            seq INTEGER NOT NULL CHECK (seq >= 0),
            answered_at TEXT NOT NULL,
            PRIMARY KEY (attempt_id, question_id),
            FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE
        );
    ",
    // Questions as they stood when the attempt was submitted.
    r"
        CREATE TABLE IF NOT EXISTS attempt_review (
            attempt_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            question_text TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('multiple_choice', 'true_false')),
            selected_option_id INTEGER,
            correct_option_id INTEGER NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            PRIMARY KEY (attempt_id, question_id),
            FOREIGN KEY (attempt_id) REFERENCES attempts(id) ON DELETE CASCADE
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS attempt_review_options (
            attempt_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            option_id INTEGER NOT NULL,
            position INTEGER NOT NULL CHECK (position >= 0),
            text TEXT NOT NULL,
            is_correct INTEGER NOT NULL CHECK (is_correct IN (0, 1)),
            PRIMARY KEY (attempt_id, question_id, option_id),
            FOREIGN KEY (attempt_id, question_id)
                REFERENCES attempt_review(attempt_id, question_id) ON DELETE CASCADE
        );
    ",
    // At most one open attempt per (user, question set).
    r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_attempts_one_open
            ON attempts (user_id, question_set_id)
            WHERE status = 'in_progress';
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_attempts_user_set
            ON attempts (user_id, question_set_id, started_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_question_sets_status_order
            ON question_sets (status, sort_order, id);
    ",
];

/// Runs the schema migrations that have not been applied yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: catalog, attempts, answers, submission reviews.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(version = 1, "applied sqlite schema migration");
    }

    Ok(())
}
