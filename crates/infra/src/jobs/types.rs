//! Webhook job record and its retry state machine.
//!
//! PENDING → RUNNING → {DONE | PENDING (retry) | DEAD}. DONE, FAILED and
//! DEAD are terminal: every transition out of them is rejected.

use core::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invsync_core::{DomainError, JobId, SubscriptionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    /// Parked outside the retry path. No transition here produces it; a row
    /// in this state is never polled and is listed alongside DEAD jobs.
    Failed,
    Dead,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Done,
        JobStatus::Failed,
        JobStatus::Dead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Done => "DONE",
            JobStatus::Failed => "FAILED",
            JobStatus::Dead => "DEAD",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Dead)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::unknown_code("job status", s))
    }
}

/// Attempt ceiling and exponential backoff unit for webhook jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempts`-th failure (1-indexed): `unit * 2^(attempts-1)`.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.checked_pow(attempts - 1).unwrap_or(u32::MAX);
        self.backoff_unit.saturating_mul(factor)
    }

    /// Whether a job that has failed `attempts` times may run again.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("job {id} is {status} and cannot transition")]
pub struct TerminalJob {
    pub id: JobId,
    pub status: JobStatus,
}

/// One queued webhook notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookJob {
    pub id: JobId,
    pub source: String,
    pub event_type: String,
    pub subscription_id: Option<SubscriptionId>,
    /// Raw JSON body as received.
    pub payload: String,
    pub status: JobStatus,
    pub attempts: u32,
    pub next_run_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WebhookJob {
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        subscription_id: Option<SubscriptionId>,
        payload: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            source: source.into(),
            event_type: event_type.into(),
            subscription_id,
            payload: payload.into(),
            status: JobStatus::Pending,
            attempts: 0,
            next_run_at: now,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.next_run_at <= now
    }

    fn ensure_live(&self) -> Result<(), TerminalJob> {
        if self.status.is_terminal() {
            return Err(TerminalJob {
                id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) -> Result<(), TerminalJob> {
        self.ensure_live()?;
        self.status = JobStatus::Running;
        self.updated_at = now;
        Ok(())
    }

    pub fn mark_done(&mut self, now: DateTime<Utc>) -> Result<(), TerminalJob> {
        self.ensure_live()?;
        self.status = JobStatus::Done;
        self.last_error = None;
        self.updated_at = now;
        Ok(())
    }

    /// Count a failed attempt: back to PENDING with backoff, or DEAD at the ceiling.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), TerminalJob> {
        self.ensure_live()?;
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.updated_at = now;

        if policy.should_retry(self.attempts) {
            let delay = chrono::Duration::from_std(policy.delay_for_attempt(self.attempts))
                .unwrap_or(chrono::Duration::MAX);
            self.status = JobStatus::Pending;
            self.next_run_at = now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC);
        } else {
            self.status = JobStatus::Dead;
        }
        Ok(())
    }

    /// Count the attempt and go straight to DEAD.
    pub fn mark_dead(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> Result<(), TerminalJob> {
        self.ensure_live()?;
        self.attempts += 1;
        self.last_error = Some(error.into());
        self.status = JobStatus::Dead;
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            backoff_unit: Duration::from_secs(60),
        }
    }

    fn job(now: DateTime<Utc>) -> WebhookJob {
        WebhookJob::new("pagstream", "subscription_update", None, "{}", now)
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let p = policy();
        assert_eq!(p.delay_for_attempt(1), Duration::from_secs(60));
        assert_eq!(p.delay_for_attempt(2), Duration::from_secs(120));
        assert_eq!(p.delay_for_attempt(4), Duration::from_secs(480));
    }

    #[test]
    fn new_job_is_ready_immediately() {
        let now = Utc::now();
        let job = job(now);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.is_ready(now));
    }

    #[test]
    fn failure_reschedules_then_dead_letters_at_ceiling() {
        let now = Utc::now();
        let mut job = job(now);
        let p = policy();

        for attempt in 1..5 {
            job.mark_running(now).unwrap();
            job.record_failure("boom", &p, now).unwrap();
            assert_eq!(job.status, JobStatus::Pending);
            assert_eq!(job.attempts, attempt);
            assert_eq!(
                job.next_run_at,
                now + chrono::Duration::seconds(60 * 2i64.pow(attempt - 1))
            );
        }

        job.mark_running(now).unwrap();
        job.record_failure("boom", &p, now).unwrap();
        assert_eq!(job.status, JobStatus::Dead);
        assert_eq!(job.attempts, 5);
        assert_eq!(job.last_error.as_deref(), Some("boom"));
    }

    #[test]
    fn terminal_jobs_reject_transitions() {
        let now = Utc::now();
        let mut done = job(now);
        done.mark_done(now).unwrap();
        assert!(done.mark_running(now).is_err());
        assert!(done.record_failure("x", &policy(), now).is_err());

        let mut dead = job(now);
        dead.mark_dead("unknown event", now).unwrap();
        assert_eq!(dead.attempts, 1);
        assert!(dead.mark_done(now).is_err());
    }

    #[test]
    fn failed_rows_are_never_polled_or_revived() {
        let now = Utc::now();
        let mut parked = job(now);
        parked.status = JobStatus::Failed;
        assert!(!parked.is_ready(now));
        assert!(parked.mark_running(now).is_err());
        assert_eq!(parked.status, JobStatus::Failed);
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in JobStatus::ALL {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("QUEUED".parse::<JobStatus>().is_err());
    }

    proptest! {
        #[test]
        fn attempts_and_next_run_increase_monotonically(failures in 1u32..12, max in 1u32..10) {
            let p = RetryPolicy { max_attempts: max, backoff_unit: Duration::from_secs(1) };
            let now = Utc::now();
            let mut job = job(now);
            let mut last_attempts = 0;
            let mut last_next_run = job.next_run_at;

            for _ in 0..failures {
                if job.status.is_terminal() {
                    prop_assert!(job.mark_running(now).is_err());
                    break;
                }
                job.mark_running(now).unwrap();
                job.record_failure("e", &p, now).unwrap();
                prop_assert!(job.attempts > last_attempts);
                if job.status == JobStatus::Pending {
                    prop_assert!(job.next_run_at > last_next_run);
                    last_next_run = job.next_run_at;
                }
                last_attempts = job.attempts;
            }
            prop_assert!(job.attempts <= max);
        }

        #[test]
        fn terminal_status_never_changes(done_first in any::<bool>()) {
            let now = Utc::now();
            let mut job = job(now);
            if done_first {
                job.mark_done(now).unwrap();
            } else {
                job.mark_dead("e", now).unwrap();
            }
            let before = job.clone();
            let _ = job.mark_running(now);
            let _ = job.mark_done(now);
            let _ = job.record_failure("e", &policy(), now);
            let _ = job.mark_dead("e", now);
            prop_assert_eq!(job, before);
        }
    }
}
