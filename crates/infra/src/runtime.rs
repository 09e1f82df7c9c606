//! In-process wiring of every collaborator over in-memory storage.

use std::sync::Arc;

use entitle_core::DomainResult;
use entitle_licensing::{Budget, License};

use crate::budget_monitor::BudgetMonitor;
use crate::config::AppConfig;
use crate::dispatcher::PropagationDispatcher;
use crate::handlers::register_handlers;
use crate::jobs::{InMemoryJobStore, JobExecutor};
use crate::license_service::{LicenseAdmin, LicenseValidator};
use crate::notifications::NotificationGateway;
use crate::repository::{InMemoryOrganization, InMemoryRepository};
use crate::scheduler::JobQueueScheduler;
use crate::writer::EntityWriter;

pub struct InMemoryRuntime {
    pub licenses: Arc<InMemoryRepository<License>>,
    pub org: Arc<InMemoryOrganization>,
    pub budgets: Arc<InMemoryRepository<Budget>>,
    pub jobs: Arc<InMemoryJobStore>,
    pub validator: Arc<LicenseValidator>,
    pub monitor: Arc<BudgetMonitor>,
    pub admin: LicenseAdmin,
    pub writer: EntityWriter,
}

impl InMemoryRuntime {
    /// Fails only if the configured thresholds are out of range.
    pub fn new(config: &AppConfig, gateway: Arc<dyn NotificationGateway>) -> DomainResult<Self> {
        let policy = config.validation_policy()?;
        let variance_threshold = config.variance_threshold()?;

        let licenses = Arc::new(InMemoryRepository::<License>::new());
        let org = Arc::new(InMemoryOrganization::new());
        let budgets = Arc::new(InMemoryRepository::<Budget>::new());
        let jobs = InMemoryJobStore::arc();

        let validator = Arc::new(LicenseValidator::new(licenses.clone(), org.clone(), policy));
        let monitor = Arc::new(BudgetMonitor::new(
            budgets.clone(),
            gateway,
            variance_threshold,
        ));
        let scheduler = Arc::new(JobQueueScheduler::new(jobs.clone(), config.retry_policy()));
        let dispatcher = Arc::new(PropagationDispatcher::new(scheduler, org.clone(), validator.clone()));

        Ok(Self {
            admin: LicenseAdmin::new(licenses.clone()),
            writer: EntityWriter::new(licenses.clone(), org.clone(), budgets.clone(), dispatcher),
            licenses,
            org,
            budgets,
            jobs,
            validator,
            monitor,
        })
    }

    /// An executor over this runtime's queue with every handler registered.
    pub fn executor(&self) -> JobExecutor<Arc<InMemoryJobStore>> {
        let mut executor = JobExecutor::new(self.jobs.clone());
        register_handlers(&mut executor, self.validator.clone(), self.monitor.clone());
        executor
    }
}
