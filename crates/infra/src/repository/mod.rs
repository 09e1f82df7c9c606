//! Persistence collaborators: single-row get/save plus the filtered counts used
//! for usage computation.

pub mod in_memory;

use std::sync::Arc;

use entitle_core::{BranchId, CompanyId, Entity};
use entitle_licensing::{Branch, Company, UsageSource, User};

pub use in_memory::{InMemoryOrganization, InMemoryRepository};

#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Get/save access to one entity type. `save` is an atomic single-row upsert.
pub trait Repository<E: Entity>: Send + Sync {
    fn get(&self, id: E::Id) -> Result<Option<E>, RepositoryError>;

    fn save(&self, entity: &E) -> Result<(), RepositoryError>;

    /// Atomic read-modify-write of one row.
    ///
    /// `apply` sees the current row and returns whether to write it back; no
    /// other write to the row can land in between. Returns the row as stored
    /// afterwards, or `None` if it does not exist (`apply` is not called).
    fn modify(&self, id: E::Id, apply: &mut dyn FnMut(&mut E) -> bool) -> Result<Option<E>, RepositoryError>;

    fn list(&self) -> Result<Vec<E>, RepositoryError>;
}

impl<E, R> Repository<E> for Arc<R>
where
    E: Entity,
    R: Repository<E> + ?Sized,
{
    fn get(&self, id: E::Id) -> Result<Option<E>, RepositoryError> {
        (**self).get(id)
    }

    fn save(&self, entity: &E) -> Result<(), RepositoryError> {
        (**self).save(entity)
    }

    fn modify(&self, id: E::Id, apply: &mut dyn FnMut(&mut E) -> bool) -> Result<Option<E>, RepositoryError> {
        (**self).modify(id, apply)
    }

    fn list(&self) -> Result<Vec<E>, RepositoryError> {
        (**self).list()
    }
}

/// The company/branch/user tree beneath licenses.
pub trait OrganizationDirectory: UsageSource<Error = RepositoryError> + Send + Sync {
    fn company(&self, id: CompanyId) -> Result<Option<Company>, RepositoryError>;

    fn branch(&self, id: BranchId) -> Result<Option<Branch>, RepositoryError>;

    fn save_company(&self, company: &Company) -> Result<(), RepositoryError>;

    fn save_branch(&self, branch: &Branch) -> Result<(), RepositoryError>;

    fn save_user(&self, user: &User) -> Result<(), RepositoryError>;
}
