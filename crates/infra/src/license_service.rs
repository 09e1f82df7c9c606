//! License services: revalidation (deferred-job consumer) and the administrative
//! transitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use entitle_core::{DomainError, LicenseId};
use entitle_licensing::{
    License, LicenseStatus, UsageSnapshot, ValidationPolicy, ValidationReport, compute_usage,
    validate,
};

use crate::repository::{OrganizationDirectory, Repository, RepositoryError};

/// Result of a revalidation run. A vanished license is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Validated(ValidationReport),
    NotFound(LicenseId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed(UsageSnapshot),
    NotFound(LicenseId),
}

/// Loads a license, re-evaluates it against fresh usage and persists the result.
///
/// Safe under repeated and concurrent delivery: usage is read fresh on every
/// run and each change is applied to the stored row in one atomic step, so a
/// concurrent admin transition is never overwritten.
pub struct LicenseValidator {
    licenses: Arc<dyn Repository<License>>,
    org: Arc<dyn OrganizationDirectory>,
    policy: ValidationPolicy,
}

impl LicenseValidator {
    pub fn new(
        licenses: Arc<dyn Repository<License>>,
        org: Arc<dyn OrganizationDirectory>,
        policy: ValidationPolicy,
    ) -> Self {
        Self {
            licenses,
            org,
            policy,
        }
    }

    pub fn validate_and_update(&self, license_id: LicenseId) -> Result<ValidationOutcome, RepositoryError> {
        self.validate_and_update_at(license_id, Utc::now())
    }

    pub fn validate_and_update_at(
        &self,
        license_id: LicenseId,
        now: DateTime<Utc>,
    ) -> Result<ValidationOutcome, RepositoryError> {
        let mut result = None;
        self.licenses.modify(license_id, &mut |license| {
            let validated = validate(license, now, &self.policy, || {
                compute_usage(self.org.as_ref(), license_id)
            });
            let write = validated.is_ok();
            result = Some(validated);
            write
        })?;

        let Some(validated) = result else {
            info!(license_id = %license_id, "license not found; dropping validation");
            return Ok(ValidationOutcome::NotFound(license_id));
        };
        let report = validated?;

        log_report(&report);
        Ok(ValidationOutcome::Validated(report))
    }

    /// Recompute and persist the usage snapshot without touching status.
    pub fn refresh_usage(&self, license_id: LicenseId) -> Result<RefreshOutcome, RepositoryError> {
        self.refresh_usage_at(license_id, Utc::now())
    }

    pub fn refresh_usage_at(
        &self,
        license_id: LicenseId,
        now: DateTime<Utc>,
    ) -> Result<RefreshOutcome, RepositoryError> {
        // Counting happens outside the row update; only the snapshot is written.
        let usage = compute_usage(self.org.as_ref(), license_id)?;
        let refreshed = self.licenses.modify(license_id, &mut |license| {
            license.record_usage(usage, now);
            true
        })?;

        if refreshed.is_none() {
            info!(license_id = %license_id, "license not found; dropping usage refresh");
            return Ok(RefreshOutcome::NotFound(license_id));
        }

        debug!(
            license_id = %license_id,
            companies = usage.company_count,
            branches = usage.branch_count,
            users = usage.user_count,
            "license usage refreshed"
        );
        Ok(RefreshOutcome::Refreshed(usage))
    }
}

fn log_report(report: &ValidationReport) {
    if report.status_changed() {
        warn!(
            license_id = %report.license_id,
            from = %report.previous_status,
            to = %report.status,
            "license status changed by validation"
        );
    }
    for violation in &report.violations {
        warn!(license_id = %report.license_id, code = violation.code(), "{}", violation.message());
    }
    for warning in &report.warnings {
        info!(license_id = %report.license_id, resource = %warning.resource, "{}", warning.message());
    }
    debug!(license_id = %report.license_id, status = %report.status, "license validated");
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdminError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Administrative surface: one-way status transitions, nothing else.
pub struct LicenseAdmin {
    licenses: Arc<dyn Repository<License>>,
}

impl LicenseAdmin {
    pub fn new(licenses: Arc<dyn Repository<License>>) -> Self {
        Self { licenses }
    }

    pub fn activate(&self, license_id: LicenseId) -> Result<License, AdminError> {
        self.apply(license_id, "activate", License::activate)
    }

    pub fn suspend(&self, license_id: LicenseId) -> Result<License, AdminError> {
        self.apply(license_id, "suspend", License::suspend)
    }

    pub fn revoke(&self, license_id: LicenseId) -> Result<License, AdminError> {
        self.apply(license_id, "revoke", License::revoke)
    }

    fn apply(
        &self,
        license_id: LicenseId,
        action: &'static str,
        transition: fn(&mut License, DateTime<Utc>) -> Result<LicenseStatus, DomainError>,
    ) -> Result<License, AdminError> {
        let now = Utc::now();
        let mut result = None;
        let stored = self.licenses.modify(license_id, &mut |license| {
            let applied = transition(license, now);
            let write = applied.is_ok();
            result = Some(applied);
            write
        })?;

        let applied = result.ok_or_else(DomainError::not_found)?;
        let from = applied.inspect_err(|e| {
            warn!(license_id = %license_id, action, error = %e, "license transition rejected");
        })?;
        let license = stored.ok_or_else(DomainError::not_found)?;

        info!(license_id = %license_id, action, from = %from, to = %license.status(), "license transition applied");
        Ok(license)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{InMemoryOrganization, InMemoryRepository};
    use chrono::Duration;
    use entitle_core::{BranchId, CompanyId, Entity};
    use entitle_licensing::{Branch, Company, LicenseLimits};
    use std::sync::Mutex;
    use std::thread;

    type Hook = Box<dyn FnOnce() + Send>;

    /// Runs a one-shot hook on first access: after `get` has read the row, or
    /// before `modify` reaches it. Stands in for a write from another caller
    /// landing between a read and the write that follows.
    struct InterleavingRepository {
        inner: Arc<InMemoryRepository<License>>,
        hook: Mutex<Option<Hook>>,
    }

    impl InterleavingRepository {
        fn fire(&self) {
            if let Some(hook) = self.hook.lock().unwrap().take() {
                hook();
            }
        }
    }

    impl Repository<License> for InterleavingRepository {
        fn get(&self, id: LicenseId) -> Result<Option<License>, RepositoryError> {
            let read = self.inner.get(id);
            self.fire();
            read
        }

        fn save(&self, license: &License) -> Result<(), RepositoryError> {
            self.inner.save(license)
        }

        fn modify(
            &self,
            id: LicenseId,
            apply: &mut dyn FnMut(&mut License) -> bool,
        ) -> Result<Option<License>, RepositoryError> {
            self.fire();
            self.inner.modify(id, apply)
        }

        fn list(&self) -> Result<Vec<License>, RepositoryError> {
            self.inner.list()
        }
    }

    fn revoke_on_first_access(f: &Fixture, id: LicenseId) -> LicenseValidator {
        let inner = f.licenses.clone();
        let admin = LicenseAdmin::new(inner.clone());
        let repo = InterleavingRepository {
            inner,
            hook: Mutex::new(Some(Box::new(move || {
                admin.revoke(id).unwrap();
            }))),
        };
        LicenseValidator::new(Arc::new(repo), f.org.clone(), ValidationPolicy::default())
    }

    struct Fixture {
        licenses: Arc<InMemoryRepository<License>>,
        org: Arc<InMemoryOrganization>,
        validator: LicenseValidator,
        admin: LicenseAdmin,
    }

    fn fixture() -> Fixture {
        let licenses = Arc::new(InMemoryRepository::<License>::new());
        let org = Arc::new(InMemoryOrganization::new());
        let validator = LicenseValidator::new(licenses.clone(), org.clone(), ValidationPolicy::default());
        let admin = LicenseAdmin::new(licenses.clone());
        Fixture {
            licenses,
            org,
            validator,
            admin,
        }
    }

    fn provision(f: &Fixture, limits: LicenseLimits, expires_at: Option<DateTime<Utc>>) -> LicenseId {
        let issued = Utc::now() - Duration::days(30);
        let license = License::issue(LicenseId::new(), "LIC-100", "Acme", limits, expires_at, issued).unwrap();
        f.licenses.save(&license).unwrap();
        license.id()
    }

    fn add_company_with_branches(f: &Fixture, license_id: LicenseId, branches: usize) -> CompanyId {
        let company = Company::new(CompanyId::new(), "Acme", Some(license_id)).unwrap();
        f.org.save_company(&company).unwrap();
        for i in 0..branches {
            f.org
                .save_branch(&Branch::new(BranchId::new(), company.id, format!("B{i}")).unwrap())
                .unwrap();
        }
        company.id
    }

    #[test]
    fn validation_persists_snapshot_and_timestamp() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited().with_max_branches(10), None);
        add_company_with_branches(&f, id, 9);

        let at = Utc::now();
        let outcome = f.validator.validate_and_update_at(id, at).unwrap();

        let ValidationOutcome::Validated(report) = outcome else {
            panic!("expected validated outcome");
        };
        assert_eq!(report.warnings.len(), 1);
        let stored = f.licenses.get(id).unwrap().unwrap();
        assert_eq!(stored.usage().branch_count, 9);
        assert_eq!(stored.last_validated(), Some(at));
    }

    #[test]
    fn missing_license_is_reported_not_raised() {
        let f = fixture();
        let id = LicenseId::new();

        assert_eq!(f.validator.validate_and_update(id).unwrap(), ValidationOutcome::NotFound(id));
        assert_eq!(f.validator.refresh_usage(id).unwrap(), RefreshOutcome::NotFound(id));
    }

    #[test]
    fn refresh_keeps_status_even_when_expired() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited(), Some(Utc::now() - Duration::days(1)));
        add_company_with_branches(&f, id, 2);

        let outcome = f.validator.refresh_usage(id).unwrap();

        assert!(matches!(outcome, RefreshOutcome::Refreshed(u) if u.branch_count == 2));
        assert_eq!(f.licenses.get(id).unwrap().unwrap().status(), LicenseStatus::Trial);
    }

    #[test]
    fn admin_transitions_are_one_way_after_revoke() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited(), None);

        assert_eq!(f.admin.activate(id).unwrap().status(), LicenseStatus::Active);
        assert_eq!(f.admin.suspend(id).unwrap().status(), LicenseStatus::Suspended);
        assert_eq!(f.admin.revoke(id).unwrap().status(), LicenseStatus::Revoked);

        let err = f.admin.activate(id).unwrap_err();
        assert!(matches!(err, AdminError::Domain(DomainError::InvariantViolation(_))));
        assert_eq!(f.licenses.get(id).unwrap().unwrap().status(), LicenseStatus::Revoked);
    }

    #[test]
    fn admin_on_missing_license_is_not_found() {
        let f = fixture();
        let err = f.admin.suspend(LicenseId::new()).unwrap_err();
        assert!(matches!(err, AdminError::Domain(DomainError::NotFound)));
    }

    #[test]
    fn revoke_during_expiry_validation_is_kept() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited(), Some(Utc::now() - Duration::days(1)));
        let validator = revoke_on_first_access(&f, id);

        let ValidationOutcome::Validated(report) = validator.validate_and_update(id).unwrap() else {
            panic!("expected validated outcome");
        };

        assert_eq!(report.status, LicenseStatus::Revoked);
        let stored = f.licenses.get(id).unwrap().unwrap();
        assert_eq!(stored.status(), LicenseStatus::Revoked);
        assert!(stored.last_validated().is_some());
    }

    #[test]
    fn revoke_during_usage_refresh_is_kept() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited(), None);
        add_company_with_branches(&f, id, 3);
        let validator = revoke_on_first_access(&f, id);

        validator.refresh_usage(id).unwrap();

        let stored = f.licenses.get(id).unwrap().unwrap();
        assert_eq!(stored.status(), LicenseStatus::Revoked);
        assert_eq!(stored.usage().branch_count, 3);
    }

    #[test]
    fn concurrent_validations_never_undo_a_revoke() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited().with_max_branches(1), None);
        add_company_with_branches(&f, id, 2);
        let validator = Arc::new(LicenseValidator::new(
            f.licenses.clone(),
            f.org.clone(),
            ValidationPolicy::default(),
        ));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let validator = validator.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        validator.validate_and_update(id).unwrap();
                        validator.refresh_usage(id).unwrap();
                    }
                })
            })
            .collect();
        f.admin.revoke(id).unwrap();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(f.licenses.get(id).unwrap().unwrap().status(), LicenseStatus::Revoked);
    }

    #[test]
    fn rejected_transition_leaves_row_unchanged() {
        let f = fixture();
        let id = provision(&f, LicenseLimits::unlimited(), None);
        f.admin.suspend(id).unwrap();
        let before = f.licenses.get(id).unwrap().unwrap();

        let err = f.admin.suspend(id).unwrap_err();

        assert!(matches!(err, AdminError::Domain(DomainError::Conflict(_))));
        assert_eq!(f.licenses.get(id).unwrap().unwrap(), before);
    }
}
