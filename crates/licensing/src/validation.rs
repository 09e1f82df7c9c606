//! License validation: expiry and seat-limit checks.
//!
//! Enforcement is soft. Limit breaches are reported as violations but never
//! change the license status; only expiry moves a license (to `Expired`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use entitle_core::{DomainError, DomainResult, Entity, LicenseId};

use crate::license::{License, LicenseLimits, LicenseStatus, ResourceKind, UsageSnapshot};

/// Default fraction of a limit at which an "approaching limit" warning is raised.
pub const DEFAULT_WARNING_RATIO: f64 = 0.9;

/// Threshold configuration for validation runs.
///
/// The ratio is held in permille so comparisons stay in integer arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    warning_permille: u32,
}

impl ValidationPolicy {
    /// `warning_ratio` must be a finite number in `(0, 1]`.
    pub fn new(warning_ratio: f64) -> DomainResult<Self> {
        if !(warning_ratio.is_finite() && warning_ratio > 0.0 && warning_ratio <= 1.0) {
            return Err(DomainError::validation(format!(
                "warning ratio must be in (0, 1], got {warning_ratio}"
            )));
        }
        Ok(Self {
            warning_permille: (warning_ratio * 1000.0).round() as u32,
        })
    }

    pub fn warning_ratio(&self) -> f64 {
        f64::from(self.warning_permille) / 1000.0
    }

    fn is_approaching(&self, usage: u32, limit: u32) -> bool {
        u64::from(usage) * 1000 >= u64::from(limit) * u64::from(self.warning_permille)
    }
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self { warning_permille: 900 }
    }
}

/// Near-limit signal: usage is at or above the warning ratio but within the limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub resource: ResourceKind,
    pub usage: u32,
    pub limit: u32,
}

impl Warning {
    pub fn message(&self) -> String {
        format!(
            "approaching limit: {} {}/{}",
            self.resource, self.usage, self.limit
        )
    }
}

/// Hard breach, recorded and returned but never raised.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    LimitExceeded {
        resource: ResourceKind,
        usage: u32,
        limit: u32,
    },
    Expired {
        expired_at: DateTime<Utc>,
    },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Violation::LimitExceeded { .. } => "limit_exceeded",
            Violation::Expired { .. } => "expired",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Violation::LimitExceeded {
                resource,
                usage,
                limit,
            } => format!("limit exceeded: {resource} {usage}/{limit}"),
            Violation::Expired { expired_at } => {
                format!("license expired at {}", expired_at.to_rfc3339())
            }
        }
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub license_id: LicenseId,
    pub previous_status: LicenseStatus,
    pub status: LicenseStatus,
    pub usage: UsageSnapshot,
    pub warnings: Vec<Warning>,
    pub violations: Vec<Violation>,
    pub validated_at: DateTime<Utc>,
}

impl ValidationReport {
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.status
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty() && self.violations.is_empty()
    }
}

/// Compare usage against limits. Unlimited resources produce nothing.
pub fn check_limits(
    limits: &LicenseLimits,
    usage: &UsageSnapshot,
    policy: &ValidationPolicy,
) -> (Vec<Warning>, Vec<Violation>) {
    let mut warnings = Vec::new();
    let mut violations = Vec::new();

    for resource in ResourceKind::ALL {
        let Some(limit) = limits.limit_for(resource) else {
            continue;
        };
        let used = usage.count_for(resource);

        if used > limit {
            violations.push(Violation::LimitExceeded {
                resource,
                usage: used,
                limit,
            });
        } else if policy.is_approaching(used, limit) {
            warnings.push(Warning {
                resource,
                usage: used,
                limit,
            });
        }
    }

    (warnings, violations)
}

/// Validate a license in place.
///
/// - A passed expiry date moves the license to `Expired` (a revoked license stays
///   revoked) and short-circuits usage counting; `count_usage` is not called.
/// - Otherwise `count_usage` supplies fresh counts, limits are checked and the
///   snapshot is replaced.
/// - `last_validated` is stamped in both cases.
///
/// Running this twice with no change in between yields the same status, warnings
/// and violations.
pub fn validate<E>(
    license: &mut License,
    now: DateTime<Utc>,
    policy: &ValidationPolicy,
    count_usage: impl FnOnce() -> Result<UsageSnapshot, E>,
) -> Result<ValidationReport, E> {
    let previous_status = license.status();

    if let Some(expired_at) = license.expires_at().filter(|_| license.is_expired_at(now)) {
        if !license.status().is_terminal() {
            let expired = license.expire(now);
            debug_assert!(expired.is_ok(), "non-terminal license failed to expire: {expired:?}");
        }
        license.mark_validated(now);

        return Ok(ValidationReport {
            license_id: license.id(),
            previous_status,
            status: license.status(),
            usage: *license.usage(),
            warnings: Vec::new(),
            violations: vec![Violation::Expired { expired_at }],
            validated_at: now,
        });
    }

    let usage = count_usage()?;
    let (warnings, violations) = check_limits(license.limits(), &usage, policy);
    license.record_usage(usage, now);

    Ok(ValidationReport {
        license_id: license.id(),
        previous_status,
        status: license.status(),
        usage,
        warnings,
        violations,
        validated_at: now,
    })
}
