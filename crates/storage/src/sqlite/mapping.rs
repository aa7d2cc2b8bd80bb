use std::collections::BTreeMap;

use quiz_core::model::{
    Answer, Attempt, AttemptId, AttemptStatus, OptionId, QuestionId, QuestionKind,
    QuestionSetId, UserId,
};
use quiz_core::scoring::{Grading, QuestionReview, ReviewOption, ScoreCard};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn(e: sqlx::Error) -> StorageError {
    StorageError::Connection(e.to_string())
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

pub(crate) fn user_id_from_i64(v: i64) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64("user_id", v)?))
}

pub(crate) fn set_id_from_i64(v: i64) -> Result<QuestionSetId, StorageError> {
    Ok(QuestionSetId::new(i64_to_u64("question_set_id", v)?))
}

pub(crate) fn question_id_from_i64(v: i64) -> Result<QuestionId, StorageError> {
    Ok(QuestionId::new(i64_to_u64("question_id", v)?))
}

pub(crate) fn option_id_from_i64(v: i64) -> Result<OptionId, StorageError> {
    Ok(OptionId::new(i64_to_u64("option_id", v)?))
}

pub(crate) fn attempt_id_from_i64(v: i64) -> Result<AttemptId, StorageError> {
    Ok(AttemptId::new(i64_to_u64("attempt_id", v)?))
}

fn u32_from_i64(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

/// Decodes one `attempt_answers` row into `(attempt, question, answer)`.
pub(crate) fn map_answer_row(
    row: &SqliteRow,
) -> Result<(AttemptId, QuestionId, Answer), StorageError> {
    let attempt_id = attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?;
    let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
    let selected = row
        .try_get::<Option<i64>, _>("selected_option_id")
        .map_err(ser)?
        .map(option_id_from_i64)
        .transpose()?;
    let seq = i64_to_u64("seq", row.try_get::<i64, _>("seq").map_err(ser)?)?;
    Ok((attempt_id, question_id, Answer { selected, seq }))
}

fn map_score(row: &SqliteRow) -> Result<Option<ScoreCard>, StorageError> {
    let correct: Option<i64> = row.try_get("correct_count").map_err(ser)?;
    let total: Option<i64> = row.try_get("total_questions").map_err(ser)?;
    let percentage: Option<i64> = row.try_get("percentage").map_err(ser)?;
    let passed: Option<i64> = row.try_get("passed").map_err(ser)?;

    match (correct, total, percentage, passed) {
        (None, None, None, None) => Ok(None),
        (Some(correct), Some(total), Some(percentage), Some(passed)) => {
            let percentage = u8::try_from(percentage).map_err(|_| {
                StorageError::Serialization(format!("invalid percentage: {percentage}"))
            })?;
            ScoreCard::from_persisted(
                u32_from_i64("correct_count", correct)?,
                u32_from_i64("total_questions", total)?,
                percentage,
                passed != 0,
            )
            .map(Some)
            .map_err(ser)
        }
        _ => Err(StorageError::Serialization(
            "partially persisted score".into(),
        )),
    }
}

/// Decodes one `attempt_review` row; its options are attached by the caller.
pub(crate) fn map_review_row(
    row: &SqliteRow,
) -> Result<(AttemptId, QuestionReview), StorageError> {
    let attempt_id = attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?;
    let kind_str: String = row.try_get("kind").map_err(ser)?;
    let review = QuestionReview {
        question_id: question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?,
        question_text: row.try_get("question_text").map_err(ser)?,
        kind: QuestionKind::parse(&kind_str).map_err(ser)?,
        options: Vec::new(),
        selected_option_id: row
            .try_get::<Option<i64>, _>("selected_option_id")
            .map_err(ser)?
            .map(option_id_from_i64)
            .transpose()?,
        correct_option_id: option_id_from_i64(
            row.try_get::<i64, _>("correct_option_id").map_err(ser)?,
        )?,
        is_correct: row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
    };
    Ok((attempt_id, review))
}

/// Decodes one `attempt_review_options` row into `(attempt, question, option)`.
pub(crate) fn map_review_option_row(
    row: &SqliteRow,
) -> Result<(AttemptId, QuestionId, ReviewOption), StorageError> {
    let attempt_id = attempt_id_from_i64(row.try_get::<i64, _>("attempt_id").map_err(ser)?)?;
    let question_id = question_id_from_i64(row.try_get::<i64, _>("question_id").map_err(ser)?)?;
    let option = ReviewOption {
        id: option_id_from_i64(row.try_get::<i64, _>("option_id").map_err(ser)?)?,
        text: row.try_get("text").map_err(ser)?,
        is_correct: row.try_get::<i64, _>("is_correct").map_err(ser)? != 0,
    };
    Ok((attempt_id, question_id, option))
}

/// Decodes an `attempts` row; answers and review lines are loaded separately.
pub(crate) fn map_attempt_row(
    row: &SqliteRow,
    answers: BTreeMap<QuestionId, Answer>,
    review: Vec<QuestionReview>,
) -> Result<Attempt, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let status = AttemptStatus::parse(&status_str).map_err(ser)?;
    let grading = match map_score(row)? {
        Some(card) => Some(Grading::from_persisted(card, review).map_err(ser)?),
        None if review.is_empty() => None,
        None => {
            return Err(StorageError::Serialization(
                "review rows stored for an unscored attempt".into(),
            ));
        }
    };

    Attempt::from_persisted(
        attempt_id_from_i64(row.try_get::<i64, _>("id").map_err(ser)?)?,
        user_id_from_i64(row.try_get::<i64, _>("user_id").map_err(ser)?)?,
        set_id_from_i64(row.try_get::<i64, _>("question_set_id").map_err(ser)?)?,
        status,
        answers,
        row.try_get("started_at").map_err(ser)?,
        row.try_get("submitted_at").map_err(ser)?,
        grading,
    )
    .map_err(ser)
}
