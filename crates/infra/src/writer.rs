//! Write path: persist an entity, then hand it to the propagation dispatcher.

use std::sync::Arc;

use tracing::debug;

use entitle_core::{CompanyId, Entity, LicenseId};
use entitle_licensing::{Branch, Budget, Company, License, User};

use crate::dispatcher::{PropagationDispatcher, SavedEntity};
use crate::repository::{OrganizationDirectory, Repository, RepositoryError};

/// Saves licenses, the organization tree and budgets.
///
/// The save itself is the only thing that can fail; propagation runs afterwards
/// and never turns a successful save into an error.
pub struct EntityWriter {
    licenses: Arc<dyn Repository<License>>,
    org: Arc<dyn OrganizationDirectory>,
    budgets: Arc<dyn Repository<Budget>>,
    dispatcher: Arc<PropagationDispatcher>,
}

impl EntityWriter {
    pub fn new(
        licenses: Arc<dyn Repository<License>>,
        org: Arc<dyn OrganizationDirectory>,
        budgets: Arc<dyn Repository<Budget>>,
        dispatcher: Arc<PropagationDispatcher>,
    ) -> Self {
        Self {
            licenses,
            org,
            budgets,
            dispatcher,
        }
    }

    pub fn save_license(&self, license: &License) -> Result<(), RepositoryError> {
        let created = self.licenses.get(license.id())?.is_none();
        self.licenses.save(license)?;
        self.saved(SavedEntity::License(license), created);
        Ok(())
    }

    pub fn save_company(&self, company: &Company) -> Result<(), RepositoryError> {
        let previous = self.org.company(company.id)?;
        let left = previous
            .as_ref()
            .and_then(|old| old.license_id)
            .filter(|old| Some(*old) != company.license_id);

        self.org.save_company(company)?;
        self.saved(SavedEntity::Company(company), previous.is_none());
        if let Some(old) = left {
            self.dispatcher.on_license_left(SavedEntity::Company(company), old);
        }
        Ok(())
    }

    pub fn save_branch(&self, branch: &Branch) -> Result<(), RepositoryError> {
        let previous = self.org.branch(branch.id)?;
        let left = match &previous {
            Some(old) if old.company_id != branch.company_id => {
                let old_license = self.company_license(old.company_id)?;
                let new_license = self.company_license(branch.company_id)?;
                old_license.filter(|old| Some(*old) != new_license)
            }
            _ => None,
        };

        self.org.save_branch(branch)?;
        self.saved(SavedEntity::Branch(branch), previous.is_none());
        if let Some(old) = left {
            self.dispatcher.on_license_left(SavedEntity::Branch(branch), old);
        }
        Ok(())
    }

    pub fn save_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.org.save_user(user)?;
        self.saved(SavedEntity::User(user), false);
        Ok(())
    }

    pub fn save_budget(&self, budget: &Budget) -> Result<(), RepositoryError> {
        let created = self.budgets.get(budget.id)?.is_none();
        self.budgets.save(budget)?;
        self.saved(SavedEntity::Budget(budget), created);
        Ok(())
    }

    fn company_license(&self, company_id: CompanyId) -> Result<Option<LicenseId>, RepositoryError> {
        Ok(self.org.company(company_id)?.and_then(|c| c.license_id))
    }

    fn saved(&self, entity: SavedEntity<'_>, created: bool) {
        debug!(entity = entity.kind(), created, "entity saved");
        self.dispatcher.on_entity_saved(entity, created);
    }
}
