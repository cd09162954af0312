//! Wires storage, checker, observer and scheduler together from a
//! [`Config`] and owns their start/stop lifecycle.

use std::io;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::config::{Backend, Config};
use crate::database::{LibsqlRepository, MemoryRepository, MonitorRepository, RepositoryError};
use crate::monitoring::checker::{Checker, HttpChecker};
use crate::monitoring::observer::{CheckObserver, FileCheckLog};
use crate::monitoring::scheduler::{MonitoringScheduler, SchedulerHandle, SchedulerSettings};
use crate::monitoring::MonitoringExecutor;
use crate::service::MonitorService;

/// Failures that prevent the process from starting. Nothing after startup is
/// fatal.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open monitor store: {0}")]
    Storage(#[from] RepositoryError),

    #[error("failed to prepare data directory: {0}")]
    DataDir(#[source] io::Error),

    #[error("failed to open check log: {0}")]
    CheckLog(#[source] io::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

pub struct Orchestrator {
    service: MonitorService,
    scheduler: MonitoringScheduler,
}

impl Orchestrator {
    /// Build every component described by `config`.
    pub async fn new(config: &Config) -> Result<Self, StartupError> {
        let repository: Arc<dyn MonitorRepository> = match config.storage.backend {
            Backend::Memory => {
                info!("Using in-memory monitor store, monitors are lost on exit");
                Arc::new(MemoryRepository::new())
            }
            Backend::Libsql => {
                let path = &config.storage.path;
                if let Some(parent) = Path::new(path).parent() {
                    std::fs::create_dir_all(parent).map_err(StartupError::DataDir)?;
                }
                info!(path = %path, "Opening libsql monitor store");
                Arc::new(LibsqlRepository::open(path).await?)
            }
        };

        let observer = FileCheckLog::open(&config.check_log.dir).map_err(StartupError::CheckLog)?;
        info!(path = %observer.path().display(), "Writing check log");

        let checker = HttpChecker::new(config.scheduler.probe_timeout())?;

        Ok(Self::with_components(
            repository,
            Arc::new(checker),
            Arc::new(observer),
            config.scheduler.settings(),
        ))
    }

    pub fn with_components(
        repository: Arc<dyn MonitorRepository>,
        checker: Arc<dyn Checker>,
        observer: Arc<dyn CheckObserver>,
        settings: SchedulerSettings,
    ) -> Self {
        let service = MonitorService::new(repository);
        let executor = Arc::new(MonitoringExecutor::new(checker, observer, service.clone()));
        let scheduler = MonitoringScheduler::new(service.clone(), executor, settings);
        Self { service, scheduler }
    }

    /// Handle for management operations. Shares per-id locking with the
    /// scheduler's write path.
    pub fn service(&self) -> MonitorService {
        self.service.clone()
    }

    /// Start the scheduler loop.
    pub fn start(self) -> (MonitorService, SchedulerHandle) {
        (self.service, self.scheduler.start())
    }
}
