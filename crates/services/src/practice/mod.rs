mod service;
mod session;

// Public API of the practice subsystem.
pub use crate::error::PracticeError;
pub use service::{DraftAnswer, PracticeService};
pub use session::{AttemptSession, SessionState};
