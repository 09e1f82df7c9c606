//! Job executor: handler registry, retry bookkeeping and worker threads.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How long an idle worker sleeps before polling again
    pub poll_interval: Duration,
    /// Number of worker threads
    pub workers: usize,
    /// Name for logging (threads are named `{name}-{n}`)
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            workers: 4,
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// How a single execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Succeeded,
    Discarded,
    /// Failed and scheduled for another attempt.
    Retrying,
    DeadLettered,
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_discarded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub current_running: usize,
    pub uptime_secs: u64,
}

impl ExecutorStats {
    fn record(&mut self, outcome: JobOutcome) {
        self.jobs_processed += 1;
        match outcome {
            JobOutcome::Succeeded => self.jobs_succeeded += 1,
            JobOutcome::Discarded => self.jobs_discarded += 1,
            JobOutcome::Retrying => self.jobs_failed += 1,
            JobOutcome::DeadLettered => {
                self.jobs_failed += 1;
                self.jobs_dead_lettered += 1;
            }
        }
    }
}

/// Handle to control running worker threads.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: Arc<AtomicBool>,
    joins: Vec<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown and wait for in-flight jobs to finish.
    pub fn shutdown(self) -> ExecutorStats {
        self.shutdown.store(true, Ordering::SeqCst);
        for join in self.joins {
            let _ = join.join();
        }
        snapshot(&self.stats)
    }

    pub fn stats(&self) -> ExecutorStats {
        snapshot(&self.stats)
    }
}

fn snapshot(stats: &Mutex<ExecutorStats>) -> ExecutorStats {
    stats.lock().map(|s| s.clone()).unwrap_or_default()
}

/// Background job executor.
///
/// Claims ready jobs from a store, runs the handler registered for the job's
/// name and records the outcome. Delivery is at-least-once: a job whose worker
/// dies mid-run is left `Running` and must be re-enqueued by an operator.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register a handler for a job name.
    ///
    /// Patterns: exact name, `prefix.*`, or `*` as a catch-all.
    pub fn register_handler<F>(&mut self, pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(pattern.into(), Box::new(handler));
    }

    fn handler_for(&self, name: &str) -> Option<&JobHandler> {
        if let Some(h) = self.handlers.get(name) {
            return Some(h);
        }

        // Longest matching `prefix.*` wins.
        let category = self
            .handlers
            .iter()
            .filter_map(|(pattern, handler)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = name.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), handler))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler);

        category.or_else(|| self.handlers.get("*"))
    }

    /// Claim and execute the next ready job, if any.
    pub fn run_next(&self) -> Result<Option<JobOutcome>, JobStoreError> {
        match self.store.claim_next()? {
            Some(mut job) => self.execute(&mut job).map(Some),
            None => Ok(None),
        }
    }

    /// Execute ready jobs until none are left. Returns how many ran.
    ///
    /// Jobs waiting on retry backoff are not ready and are left in place.
    pub fn run_until_idle(&self) -> Result<usize, JobStoreError> {
        let mut ran = 0;
        while self.run_next()?.is_some() {
            ran += 1;
        }
        Ok(ran)
    }

    /// Execute a job that has already been claimed (status `Running`).
    pub fn execute(&self, job: &mut Job) -> Result<JobOutcome, JobStoreError> {
        let started = Utc::now();

        let result = match self.handler_for(&job.name) {
            Some(handler) => handler(job),
            None => {
                warn!(job_id = %job.id, job = %job.name, "no handler registered for job");
                JobResult::Failure(format!("no handler for job: {}", job.name))
            }
        };

        match result {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job)?;
                debug!(job_id = %job.id, job = %job.name, "job completed");
                Ok(JobOutcome::Succeeded)
            }
            JobResult::Discard(reason) => {
                info!(job_id = %job.id, job = %job.name, reason = %reason, "job discarded");
                job.mark_discarded(reason, started);
                self.store.update(job)?;
                Ok(JobOutcome::Discarded)
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    warn!(job_id = %job.id, job = %job.name, attempts = job.attempt, error = %error, "job dead-lettered");
                    self.store.dead_letter(job.clone(), error)?;
                    Ok(JobOutcome::DeadLettered)
                } else {
                    debug!(job_id = %job.id, job = %job.name, attempt = job.attempt, error = %error, "job failed; retry scheduled");
                    self.store.update(job)?;
                    Ok(JobOutcome::Retrying)
                }
            }
        }
    }

    /// Spawn `config.workers` polling threads sharing this executor.
    pub fn spawn(self, config: JobExecutorConfig) -> std::io::Result<JobExecutorHandle>
    where
        S: Send,
    {
        let executor = Arc::new(self);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let started = Instant::now();

        let joins = start_workers(config.workers.max(1), &shutdown, |n| {
            let executor = executor.clone();
            let shutdown = shutdown.clone();
            let stats = stats.clone();
            let config = config.clone();

            thread::Builder::new()
                .name(format!("{}-{n}", config.name))
                .spawn(move || worker_loop(&executor, &config, &shutdown, &stats, started))
        })?;

        info!(executor = %config.name, workers = joins.len(), "job executor started");

        Ok(JobExecutorHandle {
            shutdown,
            joins,
            stats,
        })
    }
}

/// Start `count` workers. If one fails to start, the ones already running are
/// signalled and joined before the error is returned.
fn start_workers<F>(count: usize, shutdown: &AtomicBool, mut spawn_one: F) -> std::io::Result<Vec<thread::JoinHandle<()>>>
where
    F: FnMut(usize) -> std::io::Result<thread::JoinHandle<()>>,
{
    let mut joins = Vec::with_capacity(count);
    for n in 0..count {
        match spawn_one(n) {
            Ok(join) => joins.push(join),
            Err(e) => {
                error!(worker = n, error = %e, "failed to start job worker; stopping the rest");
                shutdown.store(true, Ordering::SeqCst);
                for join in joins {
                    if join.join().is_err() {
                        error!("job worker panicked during startup rollback");
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(joins)
}

fn worker_loop<S: JobStore + 'static>(
    executor: &JobExecutor<S>,
    config: &JobExecutorConfig,
    shutdown: &AtomicBool,
    stats: &Mutex<ExecutorStats>,
    started: Instant,
) {
    while !shutdown.load(Ordering::SeqCst) {
        if let Ok(mut s) = stats.lock() {
            s.uptime_secs = started.elapsed().as_secs();
        }

        let claimed = match executor.store.claim_next() {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(executor = %config.name, error = %e, "failed to claim job");
                thread::sleep(config.poll_interval);
                continue;
            }
        };

        let Some(mut job) = claimed else {
            thread::sleep(config.poll_interval);
            continue;
        };

        debug!(executor = %config.name, job_id = %job.id, job = %job.name, attempt = job.attempt, "claimed job");
        if let Ok(mut s) = stats.lock() {
            s.current_running += 1;
        }

        let outcome = executor.execute(&mut job);

        if let Ok(mut s) = stats.lock() {
            s.current_running = s.current_running.saturating_sub(1);
            if let Ok(outcome) = outcome {
                s.record(outcome);
            }
        }

        if let Err(e) = outcome {
            error!(executor = %config.name, job_id = %job.id, error = %e, "failed to record job outcome");
        }
    }

    debug!(executor = %config.name, "job worker stopped");
}
