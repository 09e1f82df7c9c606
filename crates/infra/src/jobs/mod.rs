//! Background job system with retry, backoff, and dead-letter handling.
//!
//! This is the in-process scheduling backend: the propagation dispatcher
//! enqueues named jobs here and the executor runs them on worker threads.
//!
//! - `Job`: named unit of work with a JSON argument payload
//! - `JobStore`: persistence for jobs and the dead-letter queue
//! - `JobExecutor`: runs jobs with registered handlers and retry logic
//!
//! Delivery is at-least-once and unordered; handlers must be idempotent.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle, JobOutcome};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobAttemptRecord, JobId, JobResult, JobStatus,
    RetryPolicy,
};
