//! Budget variance assessment.

use serde::{Deserialize, Serialize};

use entitle_core::{BudgetId, CompanyId, DomainError, DomainResult, Entity};

/// Entity: Budget. Amounts are in the currency's smallest unit (e.g. cents).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub id: BudgetId,
    pub company_id: CompanyId,
    pub name: String,
    /// ISO 4217 code, e.g. "USD".
    pub currency: String,
    pub planned: i64,
    pub actual: i64,
    /// Notification recipient for variance alerts.
    pub owner: String,
}

impl Budget {
    pub fn new(
        id: BudgetId,
        company_id: CompanyId,
        name: impl Into<String>,
        currency: impl Into<String>,
        planned: i64,
        owner: impl Into<String>,
    ) -> DomainResult<Self> {
        let currency = currency.into();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(DomainError::validation(format!(
                "currency must be a 3-letter ISO code, got {currency:?}"
            )));
        }
        if planned < 0 {
            return Err(DomainError::validation("planned amount cannot be negative"));
        }

        Ok(Self {
            id,
            company_id,
            name: name.into(),
            currency,
            planned,
            actual: 0,
            owner: owner.into(),
        })
    }

    pub fn record_actual(&mut self, actual: i64) -> DomainResult<()> {
        if actual < 0 {
            return Err(DomainError::validation("actual amount cannot be negative"));
        }
        self.actual = actual;
        Ok(())
    }

    /// Overspend (positive) or underspend (negative). Saturates at the `i64` bounds.
    pub fn variance(&self) -> i64 {
        self.actual.saturating_sub(self.planned)
    }

    /// Overspend above `threshold` (a fraction of the planned amount) yields an alert.
    ///
    /// Budgets with nothing planned never alert.
    pub fn assess(&self, threshold: f64) -> Option<VarianceAlert> {
        if self.planned <= 0 {
            return None;
        }

        let variance = self.variance();
        let ratio = variance as f64 / self.planned as f64;
        if ratio <= threshold {
            return None;
        }

        let severity = if ratio > threshold * 2.0 {
            VarianceSeverity::Critical
        } else {
            VarianceSeverity::Elevated
        };

        Some(VarianceAlert {
            budget_id: self.id,
            planned: self.planned,
            actual: self.actual,
            variance,
            ratio,
            severity,
        })
    }
}

impl Entity for Budget {
    type Id = BudgetId;

    fn id(&self) -> BudgetId {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarianceSeverity {
    Elevated,
    Critical,
}

/// Budget overspend beyond the configured threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarianceAlert {
    pub budget_id: BudgetId,
    pub planned: i64,
    pub actual: i64,
    pub variance: i64,
    pub ratio: f64,
    pub severity: VarianceSeverity,
}
