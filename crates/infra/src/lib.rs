//! Infrastructure layer: storage, job queue, propagation and services.
//!
//! Everything with side effects lives here; `entitle-licensing` stays pure.

pub mod budget_monitor;
pub mod config;
pub mod dispatcher;
pub mod handlers;
pub mod jobs;
pub mod license_service;
pub mod notifications;
pub mod repository;
pub mod runtime;
pub mod scheduler;
pub mod writer;

pub use budget_monitor::{BudgetMonitor, VarianceOutcome};
pub use config::AppConfig;
pub use dispatcher::{PropagationDispatcher, SavedEntity};
pub use license_service::{AdminError, LicenseAdmin, LicenseValidator, RefreshOutcome, ValidationOutcome};
pub use notifications::{Notification, NotificationGateway};
pub use runtime::InMemoryRuntime;
pub use scheduler::{JobQueueScheduler, Scheduler, SchedulerError};
pub use writer::EntityWriter;
