//! Budget variance monitoring: compares actual against planned spend and
//! notifies the budget owner when overspend crosses the threshold.

use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, warn};

use entitle_core::BudgetId;
use entitle_licensing::{Budget, VarianceAlert, VarianceSeverity};

use crate::notifications::{Channel, Notification, NotificationGateway, Priority};
use crate::repository::{Repository, RepositoryError};

pub const DEFAULT_VARIANCE_THRESHOLD: f64 = 0.1;

pub const BUDGET_VARIANCE_NOTIFICATION: &str = "budget.variance";

#[derive(Debug, Clone, PartialEq)]
pub enum VarianceOutcome {
    WithinThreshold,
    Notified(VarianceAlert),
    /// The alert was raised but the gateway refused it. Not retried.
    NotificationFailed(VarianceAlert),
    NotFound(BudgetId),
}

pub struct BudgetMonitor {
    budgets: Arc<dyn Repository<Budget>>,
    gateway: Arc<dyn NotificationGateway>,
    threshold: f64,
}

impl BudgetMonitor {
    pub fn new(
        budgets: Arc<dyn Repository<Budget>>,
        gateway: Arc<dyn NotificationGateway>,
        threshold: f64,
    ) -> Self {
        Self {
            budgets,
            gateway,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn check_variance(&self, budget_id: BudgetId) -> Result<VarianceOutcome, RepositoryError> {
        let Some(budget) = self.budgets.get(budget_id)? else {
            info!(budget_id = %budget_id, "budget not found; dropping variance check");
            return Ok(VarianceOutcome::NotFound(budget_id));
        };

        let Some(alert) = budget.assess(self.threshold) else {
            debug!(budget_id = %budget_id, variance = budget.variance(), "budget within threshold");
            return Ok(VarianceOutcome::WithinThreshold);
        };

        match self.gateway.send_notification(notification_for(&budget, &alert)) {
            Ok(()) => {
                info!(budget_id = %budget_id, ratio = alert.ratio, severity = ?alert.severity, "budget variance notified");
                Ok(VarianceOutcome::Notified(alert))
            }
            Err(e) => {
                warn!(budget_id = %budget_id, error = %e, "budget variance notification failed");
                Ok(VarianceOutcome::NotificationFailed(alert))
            }
        }
    }
}

fn notification_for(budget: &Budget, alert: &VarianceAlert) -> Notification {
    let priority = match alert.severity {
        VarianceSeverity::Critical => Priority::High,
        VarianceSeverity::Elevated => Priority::Normal,
    };

    Notification {
        recipient: budget.owner.clone(),
        kind: BUDGET_VARIANCE_NOTIFICATION.to_string(),
        context: json!({
            "budget_id": budget.id,
            "budget_name": budget.name,
            "currency": budget.currency,
            "planned": alert.planned,
            "actual": alert.actual,
            "variance": alert.variance,
            "ratio": alert.ratio,
        }),
        channel: Channel::Email,
        priority,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::InMemoryNotificationGateway;
    use crate::repository::InMemoryRepository;
    use entitle_core::CompanyId;

    fn setup(planned: i64, actual: i64) -> (BudgetMonitor, Arc<InMemoryNotificationGateway>, BudgetId) {
        let budgets = Arc::new(InMemoryRepository::<Budget>::new());
        let gateway = Arc::new(InMemoryNotificationGateway::new());

        let mut budget = Budget::new(BudgetId::new(), CompanyId::new(), "Ops", "EUR", planned, "cfo@acme.test").unwrap();
        budget.record_actual(actual).unwrap();
        budgets.save(&budget).unwrap();

        let monitor = BudgetMonitor::new(budgets, gateway.clone(), DEFAULT_VARIANCE_THRESHOLD);
        (monitor, gateway, budget.id)
    }

    #[test]
    fn overspend_notifies_owner() {
        let (monitor, gateway, id) = setup(10_000, 11_500);

        let outcome = monitor.check_variance(id).unwrap();

        assert!(matches!(outcome, VarianceOutcome::Notified(ref a) if a.severity == VarianceSeverity::Elevated));
        let sent = gateway.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, "cfo@acme.test");
        assert_eq!(sent[0].kind, BUDGET_VARIANCE_NOTIFICATION);
        assert_eq!(sent[0].priority, Priority::Normal);
        assert_eq!(sent[0].context["variance"], 1_500);
    }

    #[test]
    fn large_overspend_is_high_priority() {
        let (monitor, gateway, id) = setup(10_000, 13_000);
        monitor.check_variance(id).unwrap();
        assert_eq!(gateway.sent()[0].priority, Priority::High);
    }

    #[test]
    fn within_threshold_sends_nothing() {
        let (monitor, gateway, id) = setup(10_000, 10_900);
        assert_eq!(monitor.check_variance(id).unwrap(), VarianceOutcome::WithinThreshold);
        assert!(gateway.sent().is_empty());
    }

    #[test]
    fn gateway_failure_is_reported_not_raised() {
        let (monitor, gateway, id) = setup(100, 500);
        gateway.set_failing(true);
        assert!(matches!(
            monitor.check_variance(id).unwrap(),
            VarianceOutcome::NotificationFailed(_)
        ));
    }

    #[test]
    fn missing_budget_is_not_found() {
        let (monitor, _, _) = setup(100, 100);
        let id = BudgetId::new();
        assert_eq!(monitor.check_variance(id).unwrap(), VarianceOutcome::NotFound(id));
    }
}
