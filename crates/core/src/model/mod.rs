mod attempt;
mod catalog;
mod ids;

pub use ids::{AttemptId, OptionId, ParseIdError, QuestionId, QuestionSetId, UserId};

pub use attempt::{Answer, AnswerWrite, Attempt, AttemptError, AttemptStatus};
pub use catalog::{AnswerOption, CatalogError, Question, QuestionKind, QuestionSet, SetStatus};
