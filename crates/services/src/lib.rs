#![forbid(unsafe_code)]

pub mod app_services;
pub mod error;
pub mod identity;
pub mod practice;
pub mod progress_service;
pub mod result_service;

pub use quiz_core::Clock;

pub use app_services::AppServices;
pub use error::{AppServicesError, ErrorKind, PracticeError, ValidationError};
pub use identity::StudentContext;
pub use practice::{AttemptSession, DraftAnswer, PracticeService, SessionState};
pub use progress_service::{ActivityItem, ActivityKind, Dashboard, ProgressService, SetWithProgress};
pub use result_service::ResultService;
