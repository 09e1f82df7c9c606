//! In-memory repositories for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use entitle_core::{BranchId, CompanyId, Entity, LicenseId};
use entitle_licensing::{Branch, Company, ResourceKind, UsageSource, User, count_tree};

use super::{OrganizationDirectory, Repository, RepositoryError};

/// RwLock-guarded map keyed by entity id. Last writer wins.
#[derive(Debug)]
pub struct InMemoryRepository<E: Entity> {
    inner: RwLock<HashMap<E::Id, E>>,
}

impl<E: Entity> InMemoryRepository<E> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl<E: Entity> Default for InMemoryRepository<E> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> RepositoryError {
    RepositoryError::Storage("repository lock poisoned".to_string())
}

impl<E> Repository<E> for InMemoryRepository<E>
where
    E: Entity + Clone + Send + Sync,
    E::Id: Send + Sync,
{
    fn get(&self, id: E::Id) -> Result<Option<E>, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.get(&id).cloned())
    }

    fn save(&self, entity: &E) -> Result<(), RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        map.insert(entity.id(), entity.clone());
        Ok(())
    }

    fn modify(&self, id: E::Id, apply: &mut dyn FnMut(&mut E) -> bool) -> Result<Option<E>, RepositoryError> {
        let mut map = self.inner.write().map_err(|_| poisoned())?;
        let Some(current) = map.get(&id) else {
            return Ok(None);
        };

        // Work on a copy so a rejected change leaves the row untouched.
        let mut draft = current.clone();
        if !apply(&mut draft) {
            return Ok(Some(current.clone()));
        }
        map.insert(id, draft.clone());
        Ok(Some(draft))
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        let map = self.inner.read().map_err(|_| poisoned())?;
        Ok(map.values().cloned().collect())
    }
}

/// In-memory organization tree.
#[derive(Debug, Default)]
pub struct InMemoryOrganization {
    companies: InMemoryRepository<Company>,
    branches: InMemoryRepository<Branch>,
    users: InMemoryRepository<User>,
}

impl InMemoryOrganization {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UsageSource for InMemoryOrganization {
    type Error = RepositoryError;

    fn count_active(&self, license_id: LicenseId, resource: ResourceKind) -> Result<u32, RepositoryError> {
        let companies = self.companies.list()?;
        let branches = match resource {
            ResourceKind::Branches => self.branches.list()?,
            _ => Vec::new(),
        };
        let users = match resource {
            ResourceKind::Users => self.users.list()?,
            _ => Vec::new(),
        };

        Ok(count_tree(license_id, &companies, &branches, &users).count_for(resource))
    }
}

impl OrganizationDirectory for InMemoryOrganization {
    fn company(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError> {
        self.companies.get(id)
    }

    fn branch(&self, id: BranchId) -> Result<Option<Branch>, RepositoryError> {
        self.branches.get(id)
    }

    fn save_company(&self, company: &Company) -> Result<(), RepositoryError> {
        self.companies.save(company)
    }

    fn save_branch(&self, branch: &Branch) -> Result<(), RepositoryError> {
        self.branches.save(branch)
    }

    fn save_user(&self, user: &User) -> Result<(), RepositoryError> {
        self.users.save(user)
    }
}
