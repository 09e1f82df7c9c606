//! Core job types and policies.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job execution status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting to be picked up
    Pending,
    /// Claimed by a worker
    Running,
    /// Completed successfully
    Completed,
    /// Handler decided there is nothing to do (e.g. target row vanished); never retried
    Discarded { reason: String },
    /// Failed, will be retried
    Failed { error: String, attempt: u32 },
    /// Exhausted retries, moved to DLQ
    DeadLettered { error: String, attempts: u32 },
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Discarded { .. } | JobStatus::DeadLettered { .. }
        )
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, JobStatus::Failed { .. })
    }
}

/// How the delay grows between attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    Fixed,
    /// base, 2·base, 4·base, ...
    #[default]
    Exponential,
    /// base, 2·base, 3·base, ...
    Linear,
}

/// Retry schedule carried by every job. Delays are whole milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Cap on the computed delay (before jitter)
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
    /// Spread around the computed delay in permille; 100 means ±10%
    pub jitter_permille: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(5, Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl RetryPolicy {
    /// A single attempt; failures go straight to the dead-letter queue.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
            jitter_permille: 0,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
            jitter_permille: 100,
        }
    }

    /// Delay before the retry that follows `attempt` (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(step) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let base = whole_millis(self.base_delay);
        let cap = whole_millis(self.max_delay).max(base);
        let raw = match self.strategy {
            BackoffStrategy::Fixed => base,
            BackoffStrategy::Linear => base.saturating_mul(u64::from(attempt)),
            BackoffStrategy::Exponential => base.saturating_mul(1_u64 << step.min(32)),
        };

        Duration::from_millis(self.spread(raw.min(cap), attempt))
    }

    /// Deterministic offset within ±jitter, derived from the attempt number.
    fn spread(&self, delay_ms: u64, attempt: u32) -> u64 {
        let range = delay_ms.saturating_mul(u64::from(self.jitter_permille.min(1000))) / 1000;
        if range == 0 {
            return delay_ms;
        }
        let position = (u64::from(attempt) * 17 % 100) * 2 * range / 100;
        (delay_ms - range).saturating_add(position)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// A deferred unit of work, addressed by name (e.g. `license.validate`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub name: String,
    pub args: serde_json::Value,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Incremented on every claim
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Not claimable before this instant (retry backoff / delayed jobs)
    pub scheduled_at: Option<DateTime<Utc>>,
    pub history: Vec<JobAttemptRecord>,
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl Job {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            name: name.into(),
            args,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.scheduled_at = Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
        self
    }

    pub fn is_ready(&self) -> bool {
        self.is_ready_at(Utc::now())
    }

    pub fn is_ready_at(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_at.is_none_or(|at| now >= at)
    }

    pub fn mark_running(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
        self.updated_at = Utc::now();
    }

    pub fn mark_completed(&mut self, started_at: DateTime<Utc>) {
        self.record_attempt(started_at, None);
        self.status = JobStatus::Completed;
    }

    pub fn mark_discarded(&mut self, reason: String, started_at: DateTime<Utc>) {
        self.record_attempt(started_at, None);
        self.status = JobStatus::Discarded { reason };
    }

    /// Schedule a retry with backoff, or dead-letter once attempts are exhausted.
    pub fn mark_failed(&mut self, error: String, started_at: DateTime<Utc>) {
        self.record_attempt(started_at, Some(error.clone()));

        if self.retry_policy.should_retry(self.attempt) {
            let delay = self.retry_policy.delay_for_attempt(self.attempt);
            self.scheduled_at =
                Some(self.updated_at + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = JobStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }

    fn record_attempt(&mut self, started_at: DateTime<Utc>, error: Option<String>) {
        let now = Utc::now();
        self.updated_at = now;
        self.history.push(JobAttemptRecord {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            success: error.is_none(),
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

/// What a handler reports back to the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Nothing to do; the job completes without retry.
    Discard(String),
    /// Failed; retried according to the job's policy.
    Failure(String),
}

/// Entry in the dead-letter queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub job: Job,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

impl DeadLetterEntry {
    pub fn new(job: Job, reason: String) -> Self {
        Self {
            job,
            dead_lettered_at: Utc::now(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_calculates_correctly() {
        let policy = RetryPolicy {
            jitter_permille: 0,
            ..RetryPolicy::exponential(5, Duration::from_millis(100), Duration::from_secs(10))
        };

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(20), Duration::from_secs(10));
    }

    #[test]
    fn linear_backoff_increases_linearly() {
        let policy = RetryPolicy {
            strategy: BackoffStrategy::Linear,
            base_delay: Duration::from_millis(100),
            jitter_permille: 0,
            ..Default::default()
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(300));
    }

    #[test]
    fn jitter_stays_within_band() {
        let policy = RetryPolicy {
            jitter_permille: 100,
            ..RetryPolicy::fixed(10, Duration::from_secs(1))
        };

        for attempt in 1..=10 {
            let ms = policy.delay_for_attempt(attempt).as_millis();
            assert!((900..=1100).contains(&ms), "attempt {attempt}: {ms}ms");
        }
    }

    #[test]
    fn no_retry_dead_letters_on_first_failure() {
        let mut job = Job::new("license.validate", serde_json::json!({}))
            .with_retry_policy(RetryPolicy::no_retry());

        job.mark_running();
        job.mark_failed("boom".to_string(), Utc::now());

        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn failure_schedules_retry_then_dead_letters() {
        let mut job = Job::new("license.validate", serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_secs(30)));

        job.mark_running();
        job.mark_failed("error 1".to_string(), Utc::now());
        assert!(job.status.is_retriable());
        assert!(!job.is_ready());

        job.mark_running();
        job.mark_failed("error 2".to_string(), Utc::now());
        assert!(matches!(job.status, JobStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(job.history.len(), 2);
        assert!(job.history.iter().all(|r| !r.success));
    }

    #[test]
    fn discarded_is_terminal_and_recorded() {
        let mut job = Job::new("license.refresh_usage", serde_json::json!({}));
        job.mark_running();
        job.mark_discarded("license not found".to_string(), Utc::now());

        assert!(job.status.is_terminal());
        assert!(job.history[0].success);
    }
}
