//! Organization tree under a license: companies, branches and user seats.

use serde::{Deserialize, Serialize};

use entitle_core::{BranchId, CompanyId, DomainError, DomainResult, Entity, LicenseId, UserId};

/// Entity: Company. Optionally licensed; owns branches and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub license_id: Option<LicenseId>,
    pub is_active: bool,
    pub is_deleted: bool,
}

impl Company {
    pub fn new(id: CompanyId, name: impl Into<String>, license_id: Option<LicenseId>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("company name cannot be empty"));
        }
        Ok(Self {
            id,
            name,
            license_id,
            is_active: true,
            is_deleted: false,
        })
    }

    /// Only live companies consume license quota.
    pub fn counts_toward_usage(&self) -> bool {
        self.is_active && !self.is_deleted
    }

    pub fn is_licensed_by(&self, license_id: LicenseId) -> bool {
        self.license_id == Some(license_id)
    }
}

impl Entity for Company {
    type Id = CompanyId;

    fn id(&self) -> CompanyId {
        self.id
    }
}

/// Entity: Branch. Inherits its company's license for quota purposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub company_id: CompanyId,
    pub name: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

impl Branch {
    pub fn new(id: BranchId, company_id: CompanyId, name: impl Into<String>) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("branch name cannot be empty"));
        }
        Ok(Self {
            id,
            company_id,
            name,
            is_active: true,
            is_deleted: false,
        })
    }

    pub fn counts_toward_usage(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

impl Entity for Branch {
    type Id = BranchId;

    fn id(&self) -> BranchId {
        self.id
    }
}

/// Entity: a user seat inside a company (optionally pinned to a branch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub company_id: CompanyId,
    pub branch_id: Option<BranchId>,
    pub email: String,
    pub is_active: bool,
    pub is_deleted: bool,
}

impl User {
    pub fn new(id: UserId, company_id: CompanyId, email: impl Into<String>) -> DomainResult<Self> {
        let email = email.into();
        if !email.contains('@') {
            return Err(DomainError::validation("user email must contain '@'"));
        }
        Ok(Self {
            id,
            company_id,
            branch_id: None,
            email,
            is_active: true,
            is_deleted: false,
        })
    }

    pub fn in_branch(mut self, branch_id: BranchId) -> Self {
        self.branch_id = Some(branch_id);
        self
    }

    pub fn counts_toward_usage(&self) -> bool {
        self.is_active && !self.is_deleted
    }
}

impl Entity for User {
    type Id = UserId;

    fn id(&self) -> UserId {
        self.id
    }
}
