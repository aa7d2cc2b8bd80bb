use std::sync::Arc;

use quiz_core::model::QuestionSet;
use quiz_core::scoring::PassPolicy;
use storage::repository::{CatalogRepository, Storage};
use tracing::info;

use crate::Clock;
use crate::error::AppServicesError;
use crate::practice::PracticeService;
use crate::progress_service::ProgressService;
use crate::result_service::ResultService;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    catalog: Arc<dyn CatalogRepository>,
    practice: Arc<PracticeService>,
    progress: Arc<ProgressService>,
    results: Arc<ResultService>,
}

impl AppServices {
    #[must_use]
    pub fn new(storage: &Storage, clock: Clock, policy: PassPolicy) -> Self {
        let practice = Arc::new(
            PracticeService::new(
                clock,
                Arc::clone(&storage.catalog),
                Arc::clone(&storage.attempts),
            )
            .with_pass_policy(policy),
        );
        let progress = Arc::new(ProgressService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.attempts),
        ));
        let results = Arc::new(ResultService::new(
            Arc::clone(&storage.catalog),
            Arc::clone(&storage.attempts),
        ));

        Self {
            catalog: Arc::clone(&storage.catalog),
            practice,
            progress,
            results,
        }
    }

    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        policy: PassPolicy,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        info!(pass_threshold = policy.threshold(), "services ready");
        Ok(Self::new(&storage, clock, policy))
    }

    /// Install question sets into the catalog, replacing sets with the same id.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Storage` if a set cannot be stored.
    pub async fn install_catalog(&self, sets: &[QuestionSet]) -> Result<(), AppServicesError> {
        for set in sets {
            self.catalog.upsert_question_set(set).await?;
        }
        info!(sets = sets.len(), "installed catalog");
        Ok(())
    }

    #[must_use]
    pub fn practice(&self) -> Arc<PracticeService> {
        Arc::clone(&self.practice)
    }

    #[must_use]
    pub fn progress(&self) -> Arc<ProgressService> {
        Arc::clone(&self.progress)
    }

    #[must_use]
    pub fn results(&self) -> Arc<ResultService> {
        Arc::clone(&self.results)
    }
}
