//! Job names, argument payloads and the handlers that consume them.

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use entitle_core::{BudgetId, LicenseId};

use crate::budget_monitor::{BudgetMonitor, VarianceOutcome};
use crate::jobs::{Job, JobExecutor, JobResult, JobStore};
use crate::license_service::{LicenseValidator, RefreshOutcome, ValidationOutcome};

pub const VALIDATE_LICENSE: &str = "license.validate";
pub const REFRESH_LICENSE_USAGE: &str = "license.refresh_usage";
pub const CHECK_BUDGET_VARIANCE: &str = "budget.check_variance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseJobArgs {
    pub license_id: LicenseId,
}

impl LicenseJobArgs {
    pub fn new(license_id: LicenseId) -> Self {
        Self { license_id }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetJobArgs {
    pub budget_id: BudgetId,
}

impl BudgetJobArgs {
    pub fn new(budget_id: BudgetId) -> Self {
        Self { budget_id }
    }
}

fn decode<A: DeserializeOwned>(job: &Job) -> Result<A, JobResult> {
    serde_json::from_value(job.args.clone())
        .map_err(|e| JobResult::Failure(format!("malformed arguments for {}: {e}", job.name)))
}

/// Register the license and budget handlers on an executor.
///
/// A target that no longer exists discards the job; storage failures are
/// returned as failures so the retry policy applies.
pub fn register_handlers<S>(
    executor: &mut JobExecutor<S>,
    validator: Arc<LicenseValidator>,
    monitor: Arc<BudgetMonitor>,
) where
    S: JobStore + 'static,
{
    let v = validator.clone();
    executor.register_handler(VALIDATE_LICENSE, move |job| {
        let args: LicenseJobArgs = match decode(job) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        match v.validate_and_update(args.license_id) {
            Ok(ValidationOutcome::Validated(_)) => JobResult::Success,
            Ok(ValidationOutcome::NotFound(id)) => JobResult::Discard(format!("license {id} not found")),
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    executor.register_handler(REFRESH_LICENSE_USAGE, move |job| {
        let args: LicenseJobArgs = match decode(job) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        match validator.refresh_usage(args.license_id) {
            Ok(RefreshOutcome::Refreshed(_)) => JobResult::Success,
            Ok(RefreshOutcome::NotFound(id)) => JobResult::Discard(format!("license {id} not found")),
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });

    executor.register_handler(CHECK_BUDGET_VARIANCE, move |job| {
        let args: BudgetJobArgs = match decode(job) {
            Ok(args) => args,
            Err(failure) => return failure,
        };
        match monitor.check_variance(args.budget_id) {
            Ok(VarianceOutcome::NotFound(id)) => JobResult::Discard(format!("budget {id} not found")),
            Ok(_) => JobResult::Success,
            Err(e) => JobResult::Failure(e.to_string()),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use serde_json::json;

    use entitle_core::Entity;
    use entitle_licensing::{Budget, License, LicenseLimits, LicenseStatus, ValidationPolicy};

    use crate::jobs::{InMemoryJobStore, JobOutcome, JobStatus, RetryPolicy};
    use crate::notifications::InMemoryNotificationGateway;
    use crate::repository::{InMemoryOrganization, InMemoryRepository, Repository};

    struct Fixture {
        store: Arc<InMemoryJobStore>,
        licenses: Arc<InMemoryRepository<License>>,
        executor: JobExecutor<Arc<InMemoryJobStore>>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryJobStore::arc();
        let licenses = Arc::new(InMemoryRepository::<License>::new());
        let org = Arc::new(InMemoryOrganization::new());
        let budgets = Arc::new(InMemoryRepository::<Budget>::new());
        let validator = Arc::new(LicenseValidator::new(licenses.clone(), org, ValidationPolicy::default()));
        let monitor = Arc::new(BudgetMonitor::new(
            budgets,
            Arc::new(InMemoryNotificationGateway::new()),
            0.1,
        ));

        let mut executor = JobExecutor::new(store.clone());
        register_handlers(&mut executor, validator, monitor);
        Fixture {
            store,
            licenses,
            executor,
        }
    }

    fn enqueue(f: &Fixture, name: &str, args: serde_json::Value) -> crate::jobs::JobId {
        f.store
            .enqueue(Job::new(name, args).with_retry_policy(RetryPolicy::no_retry()))
            .unwrap()
    }

    #[test]
    fn validate_job_expires_lapsed_license() {
        let f = fixture();
        let license = License::issue(
            LicenseId::new(),
            "LIC-9",
            "Acme",
            LicenseLimits::unlimited(),
            Some(Utc::now() - Duration::days(1)),
            Utc::now() - Duration::days(60),
        )
        .unwrap();
        f.licenses.save(&license).unwrap();

        let job_id = enqueue(&f, VALIDATE_LICENSE, json!(LicenseJobArgs::new(license.id())));

        assert_eq!(f.executor.run_next().unwrap(), Some(JobOutcome::Succeeded));
        assert!(matches!(f.store.get(job_id).unwrap().unwrap().status, JobStatus::Completed));
        assert_eq!(f.licenses.get(license.id()).unwrap().unwrap().status(), LicenseStatus::Expired);
    }

    #[test]
    fn missing_targets_are_discarded() {
        let f = fixture();
        enqueue(&f, VALIDATE_LICENSE, json!({"license_id": LicenseId::new()}));
        enqueue(&f, REFRESH_LICENSE_USAGE, json!({"license_id": LicenseId::new()}));
        enqueue(&f, CHECK_BUDGET_VARIANCE, json!({"budget_id": BudgetId::new()}));

        for _ in 0..3 {
            assert_eq!(f.executor.run_next().unwrap(), Some(JobOutcome::Discarded));
        }
        assert_eq!(f.store.stats().unwrap().discarded, 3);
    }

    #[test]
    fn malformed_arguments_fail_the_job() {
        let f = fixture();
        enqueue(&f, VALIDATE_LICENSE, json!({"license": "nope"}));

        assert_eq!(f.executor.run_next().unwrap(), Some(JobOutcome::DeadLettered));
        assert_eq!(f.store.list_dead_letters(10).unwrap().len(), 1);
    }
}
