//! Licensing domain module.
//!
//! License lifecycle, usage counting over the License → Company → Branch tree,
//! limit validation and budget variance assessment. Everything here is
//! deterministic domain logic (no IO, no scheduling, no storage).

pub mod budget;
pub mod license;
pub mod org;
pub mod usage;
pub mod validation;

pub use budget::{Budget, VarianceAlert, VarianceSeverity};
pub use license::{License, LicenseLimits, LicenseStatus, ResourceKind, UsageSnapshot};
pub use org::{Branch, Company, User};
pub use usage::{UsageSource, compute_usage, count_tree};
pub use validation::{ValidationPolicy, ValidationReport, Violation, Warning, validate};
