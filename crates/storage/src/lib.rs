#![forbid(unsafe_code)]

pub mod repository;
pub mod sqlite;

pub use repository::{
    AnswerUpsert, AttemptRepository, CatalogRepository, InMemoryRepository, NewAttempt, Storage,
    StorageError,
};
