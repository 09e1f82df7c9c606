//! Scheduling collaborator: fire-and-forget, at-least-once deferred work.

use tracing::debug;

use crate::jobs::{Job, JobStore, RetryPolicy};

#[derive(Debug, Clone, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduling backend unavailable: {0}")]
    Unavailable(String),
    #[error("invalid job: {0}")]
    InvalidJob(String),
}

/// Defers a named unit of work. Nothing is returned to the caller beyond
/// whether the job was accepted.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, job_name: &str, args: serde_json::Value) -> Result<(), SchedulerError>;
}

/// Scheduler backed by a [`JobStore`] queue.
#[derive(Debug)]
pub struct JobQueueScheduler<S: JobStore> {
    store: S,
    retry_policy: RetryPolicy,
}

impl<S: JobStore> JobQueueScheduler<S> {
    pub fn new(store: S, retry_policy: RetryPolicy) -> Self {
        Self { store, retry_policy }
    }
}

impl<S: JobStore> Scheduler for JobQueueScheduler<S> {
    fn schedule(&self, job_name: &str, args: serde_json::Value) -> Result<(), SchedulerError> {
        if job_name.trim().is_empty() {
            return Err(SchedulerError::InvalidJob("job name cannot be empty".to_string()));
        }

        let job = Job::new(job_name, args).with_retry_policy(self.retry_policy.clone());
        let job_id = self
            .store
            .enqueue(job)
            .map_err(|e| SchedulerError::Unavailable(e.to_string()))?;

        debug!(job_id = %job_id, job = job_name, "job scheduled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::InMemoryJobStore;
    use serde_json::json;

    #[test]
    fn schedule_enqueues_with_policy() {
        let store = InMemoryJobStore::arc();
        let scheduler = JobQueueScheduler::new(store.clone(), RetryPolicy::no_retry());

        scheduler.schedule("license.validate", json!({"license_id": "x"})).unwrap();

        let jobs = store.list_by_name("license.validate", 10).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].args, json!({"license_id": "x"}));
        assert_eq!(jobs[0].retry_policy, RetryPolicy::no_retry());
    }

    #[test]
    fn empty_name_is_rejected() {
        let scheduler = JobQueueScheduler::new(InMemoryJobStore::new(), RetryPolicy::default());
        assert!(matches!(
            scheduler.schedule(" ", json!({})),
            Err(SchedulerError::InvalidJob(_))
        ));
    }
}
