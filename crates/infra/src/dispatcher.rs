//! Save-time propagation: decides, per saved entity, whether license usage needs
//! re-evaluating and either schedules the work or does it inline.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, warn};

use entitle_core::{Entity, LicenseId};
use entitle_licensing::{Branch, Budget, Company, License, User};

use crate::handlers::{
    BudgetJobArgs, CHECK_BUDGET_VARIANCE, LicenseJobArgs, REFRESH_LICENSE_USAGE, VALIDATE_LICENSE,
};
use crate::license_service::{LicenseValidator, RefreshOutcome};
use crate::repository::OrganizationDirectory;
use crate::scheduler::Scheduler;

/// An entity that was just persisted.
#[derive(Debug, Clone, Copy)]
pub enum SavedEntity<'a> {
    License(&'a License),
    Company(&'a Company),
    Branch(&'a Branch),
    User(&'a User),
    Budget(&'a Budget),
}

impl SavedEntity<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            SavedEntity::License(_) => "license",
            SavedEntity::Company(_) => "company",
            SavedEntity::Branch(_) => "branch",
            SavedEntity::User(_) => "user",
            SavedEntity::Budget(_) => "budget",
        }
    }
}

/// Runs after every save. Never fails: anything that goes wrong is logged and
/// the save stands.
pub struct PropagationDispatcher {
    scheduler: Arc<dyn Scheduler>,
    org: Arc<dyn OrganizationDirectory>,
    validator: Arc<LicenseValidator>,
}

impl PropagationDispatcher {
    pub fn new(
        scheduler: Arc<dyn Scheduler>,
        org: Arc<dyn OrganizationDirectory>,
        validator: Arc<LicenseValidator>,
    ) -> Self {
        Self {
            scheduler,
            org,
            validator,
        }
    }

    pub fn on_entity_saved(&self, entity: SavedEntity<'_>, created: bool) {
        match entity {
            SavedEntity::License(license) => {
                if created || license.status().is_in_service() {
                    self.schedule(VALIDATE_LICENSE, &LicenseJobArgs::new(license.id()));
                } else {
                    debug!(license_id = %license.id(), status = %license.status(), "license out of service; not revalidating");
                }
            }
            SavedEntity::Company(company) => match company.license_id {
                Some(license_id) => self.schedule(REFRESH_LICENSE_USAGE, &LicenseJobArgs::new(license_id)),
                None => debug!(company_id = %company.id, "company has no license; nothing to propagate"),
            },
            SavedEntity::Branch(branch) => self.refresh_for_branch(branch),
            // Seats are picked up by the next validation of their license.
            SavedEntity::User(_) => {}
            SavedEntity::Budget(budget) => {
                self.schedule(CHECK_BUDGET_VARIANCE, &BudgetJobArgs::new(budget.id));
            }
        }
    }

    /// A company or branch was saved under a different license than before.
    /// The license it left is refreshed the same way the new one is.
    pub fn on_license_left(&self, entity: SavedEntity<'_>, previous: LicenseId) {
        debug!(entity = entity.kind(), license_id = %previous, "entity moved off license");
        match entity {
            SavedEntity::Company(_) => self.schedule(REFRESH_LICENSE_USAGE, &LicenseJobArgs::new(previous)),
            SavedEntity::Branch(branch) => self.refresh_inline(branch, previous),
            SavedEntity::License(_) | SavedEntity::User(_) | SavedEntity::Budget(_) => {}
        }
    }

    fn refresh_for_branch(&self, branch: &Branch) {
        let company = match self.org.company(branch.company_id) {
            Ok(Some(company)) => company,
            Ok(None) => {
                debug!(branch_id = %branch.id, company_id = %branch.company_id, "branch company missing; nothing to propagate");
                return;
            }
            Err(e) => {
                error!(branch_id = %branch.id, error = %e, "company lookup failed during branch propagation");
                return;
            }
        };

        if let Some(license_id) = company.license_id {
            self.refresh_inline(branch, license_id);
        }
    }

    fn refresh_inline(&self, branch: &Branch, license_id: LicenseId) {
        match self.validator.refresh_usage(license_id) {
            Ok(RefreshOutcome::Refreshed(_)) => {}
            Ok(RefreshOutcome::NotFound(_)) => {
                warn!(branch_id = %branch.id, license_id = %license_id, "company references a missing license");
            }
            Err(e) => {
                error!(branch_id = %branch.id, license_id = %license_id, error = %e, "inline usage refresh failed");
            }
        }
    }

    fn schedule<A: Serialize>(&self, job_name: &str, args: &A) {
        let args = match serde_json::to_value(args) {
            Ok(args) => args,
            Err(e) => {
                error!(job = job_name, error = %e, "failed to encode job arguments");
                return;
            }
        };

        if let Err(e) = self.scheduler.schedule(job_name, args) {
            warn!(job = job_name, error = %e, "failed to schedule propagation job");
        }
    }
}
