use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use entitle_core::{DomainError, DomainResult, Entity, LicenseId, ValueObject};

/// License lifecycle status.
///
/// `Revoked` is terminal. `Expired` is reached from Trial/Active/Suspended once
/// the expiry date has passed and cannot be left either.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Trial,
    Active,
    Suspended,
    Revoked,
    Expired,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trial => "trial",
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Revoked => "revoked",
            Self::Expired => "expired",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Revoked | Self::Expired)
    }

    /// Trial and Active licenses are the ones whose saves trigger revalidation.
    pub fn is_in_service(&self) -> bool {
        matches!(self, Self::Trial | Self::Active)
    }
}

impl core::fmt::Display for LicenseStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A quota-limited resource under a license.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Companies,
    Branches,
    Users,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [Self::Companies, Self::Branches, Self::Users];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Companies => "companies",
            Self::Branches => "branches",
            Self::Users => "users",
        }
    }
}

impl core::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Seat limits. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseLimits {
    pub max_companies: Option<u32>,
    pub max_branches: Option<u32>,
    pub max_users: Option<u32>,
}

impl ValueObject for LicenseLimits {}

impl LicenseLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn with_max_companies(mut self, max: u32) -> Self {
        self.max_companies = Some(max);
        self
    }

    pub fn with_max_branches(mut self, max: u32) -> Self {
        self.max_branches = Some(max);
        self
    }

    pub fn with_max_users(mut self, max: u32) -> Self {
        self.max_users = Some(max);
        self
    }

    pub fn limit_for(&self, resource: ResourceKind) -> Option<u32> {
        match resource {
            ResourceKind::Companies => self.max_companies,
            ResourceKind::Branches => self.max_branches,
            ResourceKind::Users => self.max_users,
        }
    }
}

/// Last-computed usage counts under a license.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub company_count: u32,
    pub branch_count: u32,
    pub user_count: u32,
}

impl ValueObject for UsageSnapshot {}

impl UsageSnapshot {
    pub fn new(company_count: u32, branch_count: u32, user_count: u32) -> Self {
        Self {
            company_count,
            branch_count,
            user_count,
        }
    }

    pub fn count_for(&self, resource: ResourceKind) -> u32 {
        match resource {
            ResourceKind::Companies => self.company_count,
            ResourceKind::Branches => self.branch_count,
            ResourceKind::Users => self.user_count,
        }
    }
}

/// Entity: License.
///
/// Fields are only mutated through the transition methods below, which is what
/// keeps the status rules in one place. Company and branch writes never touch a
/// license directly; they go through revalidation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    id: LicenseId,
    code: String,
    licensee: String,
    status: LicenseStatus,
    limits: LicenseLimits,
    expires_at: Option<DateTime<Utc>>,
    usage: UsageSnapshot,
    last_validated: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Entity for License {
    type Id = LicenseId;

    fn id(&self) -> LicenseId {
        self.id
    }
}

impl License {
    /// Provision a new license. New licenses start in `Trial`.
    pub fn issue(
        id: LicenseId,
        code: impl Into<String>,
        licensee: impl Into<String>,
        limits: LicenseLimits,
        expires_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let code = code.into();
        if code.trim().is_empty() {
            return Err(DomainError::validation("license code cannot be empty"));
        }

        Ok(Self {
            id,
            code,
            licensee: licensee.into(),
            status: LicenseStatus::Trial,
            limits,
            expires_at,
            usage: UsageSnapshot::default(),
            last_validated: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn licensee(&self) -> &str {
        &self.licensee
    }

    pub fn status(&self) -> LicenseStatus {
        self.status
    }

    pub fn limits(&self) -> &LicenseLimits {
        &self.limits
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn usage(&self) -> &UsageSnapshot {
        &self.usage
    }

    pub fn last_validated(&self) -> Option<DateTime<Utc>> {
        self.last_validated
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// True once the expiry date lies strictly in the past.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at < now)
    }

    /// Administrative: Trial | Suspended → Active.
    pub fn activate(&mut self, now: DateTime<Utc>) -> DomainResult<LicenseStatus> {
        if self.status != LicenseStatus::Active && self.is_expired_at(now) {
            return Err(DomainError::invariant("license has passed its expiry date"));
        }
        self.transition(LicenseStatus::Active, now)
    }

    /// Administrative: Trial | Active → Suspended.
    pub fn suspend(&mut self, now: DateTime<Utc>) -> DomainResult<LicenseStatus> {
        self.transition(LicenseStatus::Suspended, now)
    }

    /// Administrative: any non-revoked status → Revoked. There is no way back.
    pub fn revoke(&mut self, now: DateTime<Utc>) -> DomainResult<LicenseStatus> {
        self.transition(LicenseStatus::Revoked, now)
    }

    /// Validation-driven: Trial | Active | Suspended → Expired.
    pub(crate) fn expire(&mut self, now: DateTime<Utc>) -> DomainResult<LicenseStatus> {
        self.transition(LicenseStatus::Expired, now)
    }

    /// Replace the usage snapshot and stamp `last_validated`.
    pub fn record_usage(&mut self, usage: UsageSnapshot, now: DateTime<Utc>) {
        self.usage = usage;
        self.mark_validated(now);
    }

    pub(crate) fn mark_validated(&mut self, now: DateTime<Utc>) {
        self.last_validated = Some(now);
        self.updated_at = now;
    }

    fn transition(&mut self, to: LicenseStatus, now: DateTime<Utc>) -> DomainResult<LicenseStatus> {
        let from = self.status;
        if from == to {
            return Err(DomainError::conflict(format!("license is already {to}")));
        }
        if !can_transition(from, to) {
            return Err(DomainError::invariant(format!(
                "license cannot move from {from} to {to}"
            )));
        }

        self.status = to;
        self.updated_at = now;
        Ok(from)
    }
}

fn can_transition(from: LicenseStatus, to: LicenseStatus) -> bool {
    use LicenseStatus::*;

    match (from, to) {
        (Revoked, _) => false,
        (Trial | Suspended, Active) => true,
        (Trial | Active, Suspended) => true,
        (_, Revoked) => true,
        (Trial | Active | Suspended, Expired) => true,
        _ => false,
    }
}
