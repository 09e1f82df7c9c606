//! Job storage implementations.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;

use super::types::{DeadLetterEntry, Job, JobId, JobStatus};

/// Job store abstraction.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Claim the oldest pending (or retry-due) job and mark it running.
    /// Returns `None` if nothing is ready.
    fn claim_next(&self) -> Result<Option<Job>, JobStoreError>;

    /// List jobs by name, oldest first.
    fn list_by_name(&self, name: &str, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    /// Move a job to the dead-letter queue.
    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError>;

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError>;

    /// Move a dead-lettered job back to pending with a fresh attempt count.
    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError>;

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError>;

    fn stats(&self) -> Result<JobStats, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub discarded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

/// How many completed/discarded jobs are kept for inspection by default.
pub const DEFAULT_FINISHED_RETENTION: usize = 1024;

/// In-memory job store for tests/dev.
///
/// Finished jobs (completed or discarded) are kept up to a retention cap and
/// then evicted oldest-first; `stats` still counts them.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, Job>>,
    dead_letters: RwLock<HashMap<JobId, DeadLetterEntry>>,
    finished: Mutex<VecDeque<JobId>>,
    retention: usize,
    evicted_completed: AtomicUsize,
    evicted_discarded: AtomicUsize,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::with_retention(DEFAULT_FINISHED_RETENTION)
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: usize) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            dead_letters: RwLock::new(HashMap::new()),
            finished: Mutex::new(VecDeque::new()),
            retention,
            evicted_completed: AtomicUsize::new(0),
            evicted_discarded: AtomicUsize::new(0),
        }
    }

    /// Track a finished job and evict the oldest beyond the retention cap.
    fn retire(&self, jobs: &mut HashMap<JobId, Job>, job_id: JobId) -> Result<(), JobStoreError> {
        let mut finished = self.finished.lock().map_err(|_| poisoned())?;
        finished.push_back(job_id);

        while finished.len() > self.retention {
            let Some(oldest) = finished.pop_front() else {
                break;
            };
            match jobs.get(&oldest).map(|j| &j.status) {
                Some(JobStatus::Completed) => {
                    jobs.remove(&oldest);
                    self.evicted_completed.fetch_add(1, Ordering::Relaxed);
                }
                Some(JobStatus::Discarded { .. }) => {
                    jobs.remove(&oldest);
                    self.evicted_discarded.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn jobs_read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.read().map_err(|_| poisoned())
    }

    fn jobs_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, Job>>, JobStoreError> {
        self.jobs.write().map_err(|_| poisoned())
    }

    fn dls_read(&self) -> Result<RwLockReadGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.read().map_err(|_| poisoned())
    }

    fn dls_write(&self) -> Result<RwLockWriteGuard<'_, HashMap<JobId, DeadLetterEntry>>, JobStoreError> {
        self.dead_letters.write().map_err(|_| poisoned())
    }
}

fn poisoned() -> JobStoreError {
    JobStoreError::Storage("job store lock poisoned".to_string())
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut jobs = self.jobs_write()?;
        if jobs.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        jobs.insert(id, job);
        Ok(id)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        Ok(self.jobs_read()?.get(&job_id).cloned())
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_write()?;
        let Some(slot) = jobs.get_mut(&job.id) else {
            return Err(JobStoreError::NotFound(job.id));
        };
        let was_finished = slot.status.is_terminal();
        *slot = job.clone();

        if job.status.is_terminal() && !was_finished {
            self.retire(&mut jobs, job.id)?;
        }
        Ok(())
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        let mut jobs = self.jobs_write()?;
        let now = Utc::now();

        // FIFO by creation time among ready jobs.
        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.status, JobStatus::Pending | JobStatus::Failed { .. }) && j.is_ready_at(now)
            })
            .min_by_key(|j| (j.created_at, j.id.0))
            .map(|j| j.id);

        Ok(next.and_then(|id| {
            jobs.get_mut(&id).map(|job| {
                job.mark_running();
                job.clone()
            })
        }))
    }

    fn list_by_name(&self, name: &str, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let jobs = self.jobs_read()?;
        let mut result: Vec<_> = jobs.values().filter(|j| j.name == name).cloned().collect();

        result.sort_by_key(|j| j.created_at);
        result.truncate(limit);
        Ok(result)
    }

    fn dead_letter(&self, mut job: Job, reason: String) -> Result<(), JobStoreError> {
        let mut jobs = self.jobs_write()?;
        let mut dls = self.dls_write()?;

        job.status = JobStatus::DeadLettered {
            error: reason.clone(),
            attempts: job.attempt,
        };
        job.updated_at = Utc::now();

        jobs.remove(&job.id);
        dls.insert(job.id, DeadLetterEntry::new(job, reason));
        Ok(())
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        let dls = self.dls_read()?;
        let mut result: Vec<_> = dls.values().cloned().collect();

        result.sort_by_key(|e| e.dead_lettered_at);
        result.truncate(limit);
        Ok(result)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut jobs = self.jobs_write()?;
        let mut dls = self.dls_write()?;

        let entry = dls.remove(&job_id).ok_or(JobStoreError::NotFound(job_id))?;

        let mut job = entry.job;
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.scheduled_at = None;
        job.updated_at = Utc::now();
        job.history.clear();

        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        self.dls_write()?
            .remove(&job_id)
            .map(|_| ())
            .ok_or(JobStoreError::NotFound(job_id))
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        let jobs = self.jobs_read()?;
        let dls = self.dls_read()?;

        let mut stats = JobStats::default();
        for job in jobs.values() {
            match &job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Discarded { .. } => stats.discarded += 1,
                JobStatus::Failed { .. } => stats.failed += 1,
                JobStatus::DeadLettered { .. } => stats.dead_lettered += 1,
            }
        }
        stats.dead_lettered += dls.len();
        stats.completed += self.evicted_completed.load(Ordering::Relaxed);
        stats.discarded += self.evicted_discarded.load(Ordering::Relaxed);

        Ok(stats)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next()
    }

    fn list_by_name(&self, name: &str, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list_by_name(name, limit)
    }

    fn dead_letter(&self, job: Job, reason: String) -> Result<(), JobStoreError> {
        (**self).dead_letter(job, reason)
    }

    fn list_dead_letters(&self, limit: usize) -> Result<Vec<DeadLetterEntry>, JobStoreError> {
        (**self).list_dead_letters(limit)
    }

    fn retry_dead_letter(&self, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).retry_dead_letter(job_id)
    }

    fn delete_dead_letter(&self, job_id: JobId) -> Result<(), JobStoreError> {
        (**self).delete_dead_letter(job_id)
    }

    fn stats(&self) -> Result<JobStats, JobStoreError> {
        (**self).stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enqueue_and_claim() {
        let store = InMemoryJobStore::new();

        let job_id = store.enqueue(Job::new("license.validate", json!({}))).unwrap();

        let claimed = store.claim_next().unwrap().unwrap();
        assert_eq!(claimed.id, job_id);
        assert!(matches!(claimed.status, JobStatus::Running));
        assert_eq!(claimed.attempt, 1);

        assert!(store.claim_next().unwrap().is_none());
    }

    #[test]
    fn duplicate_enqueue_is_rejected() {
        let store = InMemoryJobStore::new();
        let job = Job::new("license.validate", json!({}));

        store.enqueue(job.clone()).unwrap();
        assert!(matches!(
            store.enqueue(job),
            Err(JobStoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn delayed_jobs_are_not_claimed_early() {
        let store = InMemoryJobStore::new();
        store
            .enqueue(Job::new("license.validate", json!({})).delayed(std::time::Duration::from_secs(60)))
            .unwrap();

        assert!(store.claim_next().unwrap().is_none());
        assert_eq!(store.stats().unwrap().pending, 1);
    }

    #[test]
    fn dead_letter_flow() {
        let store = InMemoryJobStore::new();
        let job = Job::new("license.validate", json!({}));
        let job_id = job.id;
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        claimed.mark_failed("test error".to_string(), Utc::now());
        store.dead_letter(claimed, "max retries exceeded".to_string()).unwrap();

        assert!(store.get(job_id).unwrap().is_none());
        let dls = store.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);

        let retried = store.retry_dead_letter(job_id).unwrap();
        assert!(matches!(retried.status, JobStatus::Pending));
        assert_eq!(retried.attempt, 0);
        assert!(store.list_dead_letters(10).unwrap().is_empty());
    }

    #[test]
    fn delete_missing_dead_letter_is_not_found() {
        let store = InMemoryJobStore::new();
        assert!(matches!(
            store.delete_dead_letter(JobId::new()),
            Err(JobStoreError::NotFound(_))
        ));
    }

    #[test]
    fn stats_tracking() {
        let store = InMemoryJobStore::new();
        for i in 0..5 {
            store.enqueue(Job::new("license.validate", json!({"i": i}))).unwrap();
        }

        assert_eq!(store.stats().unwrap().pending, 5);

        store.claim_next().unwrap();
        store.claim_next().unwrap();

        let stats = store.stats().unwrap();
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.running, 2);
        assert_eq!(store.list_by_name("license.validate", 10).unwrap().len(), 5);
        assert_eq!(store.list_by_name("budget.check_variance", 10).unwrap().len(), 0);
    }

    #[test]
    fn finished_jobs_are_evicted_past_retention() {
        let store = InMemoryJobStore::with_retention(2);
        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(store.enqueue(Job::new("license.validate", json!({"i": i}))).unwrap());
        }
        store.enqueue(Job::new("license.refresh_usage", json!({}))).unwrap();

        for _ in 0..4 {
            let mut job = store.claim_next().unwrap().unwrap();
            job.mark_completed(Utc::now());
            store.update(&job).unwrap();
        }
        let mut job = store.claim_next().unwrap().unwrap();
        job.mark_discarded("license gone".to_string(), Utc::now());
        store.update(&job).unwrap();

        // Only the two most recent finished jobs stay addressable.
        assert!(store.get(ids[0]).unwrap().is_none());
        assert!(store.get(ids[2]).unwrap().is_none());
        assert!(store.get(ids[3]).unwrap().is_some());
        assert!(store.get(ids[4]).unwrap().is_some());

        let stats = store.stats().unwrap();
        assert_eq!(stats.completed, 4);
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(store.list_by_name("license.validate", 10).unwrap().len(), 2);
    }

    #[test]
    fn update_of_unknown_job_is_not_found() {
        let store = InMemoryJobStore::new();
        let job = Job::new("license.validate", json!({}));

        assert!(matches!(store.update(&job), Err(JobStoreError::NotFound(_))));
        assert!(store.get(job.id).unwrap().is_none());
    }
}
