//! Usage counting over the License → Company → Branch tree.
//!
//! Counting is side-effect free: it never caches and never writes. Callers feed
//! the result into [`crate::validation::validate`] or
//! [`crate::License::record_usage`].

use std::collections::HashSet;

use entitle_core::{CompanyId, LicenseId};

use crate::license::{ResourceKind, UsageSnapshot};
use crate::org::{Branch, Company, User};

/// Filtered-count queries offered by the persistence layer.
///
/// Implementations must count only live entities (active and not deleted) and,
/// for branches and users, only those whose owning company is itself live and
/// licensed by `license_id`.
pub trait UsageSource {
    type Error;

    fn count_active(&self, license_id: LicenseId, resource: ResourceKind) -> Result<u32, Self::Error>;
}

/// Compute the current usage snapshot for a license.
pub fn compute_usage<S>(source: &S, license_id: LicenseId) -> Result<UsageSnapshot, S::Error>
where
    S: UsageSource + ?Sized,
{
    Ok(UsageSnapshot {
        company_count: source.count_active(license_id, ResourceKind::Companies)?,
        branch_count: source.count_active(license_id, ResourceKind::Branches)?,
        user_count: source.count_active(license_id, ResourceKind::Users)?,
    })
}

/// Count a license's usage from in-memory slices of the tree.
///
/// This is the reference semantics for [`UsageSource`] implementations.
pub fn count_tree(
    license_id: LicenseId,
    companies: &[Company],
    branches: &[Branch],
    users: &[User],
) -> UsageSnapshot {
    let live_companies: HashSet<CompanyId> = companies
        .iter()
        .filter(|c| c.is_licensed_by(license_id) && c.counts_toward_usage())
        .map(|c| c.id)
        .collect();

    let branch_count = branches
        .iter()
        .filter(|b| b.counts_toward_usage() && live_companies.contains(&b.company_id))
        .count();

    let user_count = users
        .iter()
        .filter(|u| u.counts_toward_usage() && live_companies.contains(&u.company_id))
        .count();

    UsageSnapshot {
        company_count: saturating_u32(live_companies.len()),
        branch_count: saturating_u32(branch_count),
        user_count: saturating_u32(user_count),
    }
}

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}
