//! Polling worker for webhook jobs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::types::{JobStatus, WebhookJob};
use crate::config::JobConfig;
use crate::gate::ApiGate;
use crate::store::{JobStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    #[error("no handler for event type `{0}`")]
    UnknownEventType(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Body of one event type.
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn handle(&self, job: &WebhookJob, now: DateTime<Utc>) -> Result<(), JobError>;
}

/// What happens to a job nobody registered a handler for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownEventPolicy {
    /// Counts as a failure and consumes the retry budget.
    #[default]
    Retry,
    /// DEAD on the first attempt.
    DeadLetter,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Gate was busy; nothing was drained.
    pub skipped: bool,
    pub processed: usize,
    pub succeeded: usize,
    pub retried: usize,
    pub dead: usize,
    pub stuck: usize,
    /// Jobs whose state could not be written; they are picked up again later.
    pub store_errors: usize,
}

pub struct WebhookWorker<S> {
    store: Arc<S>,
    gate: ApiGate,
    gate_timeout: Duration,
    config: JobConfig,
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl<S: JobStore> WebhookWorker<S> {
    pub fn new(store: Arc<S>, gate: ApiGate, gate_timeout: Duration, config: JobConfig) -> Self {
        Self {
            store,
            gate,
            gate_timeout,
            config,
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler(&mut self, event_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(event_type.into(), handler);
    }

    pub fn with_handler(mut self, event_type: impl Into<String>, handler: Arc<dyn JobHandler>) -> Self {
        self.register_handler(event_type, handler);
        self
    }

    pub async fn run_once(&self) -> Result<DrainReport, StoreError> {
        self.run_once_at(Utc::now()).await
    }

    /// Drain up to one batch of ready jobs under the billing-provider gate.
    #[instrument(skip(self), err)]
    pub async fn run_once_at(&self, now: DateTime<Utc>) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();

        let _permit = match self.gate.acquire("webhook-jobs", self.gate_timeout).await {
            Ok(permit) => permit,
            Err(err) => {
                info!(error = %err, "gate busy, skipping webhook drain");
                report.skipped = true;
                return Ok(report);
            }
        };

        report.stuck = self.report_stuck(now).await?;

        let jobs = self.store.ready_jobs(now, self.config.batch_size).await?;
        for job in jobs {
            let job_id = job.id;
            match self.process(job, now).await {
                Ok(outcome) => {
                    report.processed += 1;
                    match outcome {
                        JobStatus::Done => report.succeeded += 1,
                        JobStatus::Dead => report.dead += 1,
                        _ => report.retried += 1,
                    }
                }
                Err(err) => {
                    error!(job_id = %job_id, error = %err, "failed to persist job state");
                    report.store_errors += 1;
                }
            }
        }

        if report.processed > 0 || report.store_errors > 0 {
            info!(
                processed = report.processed,
                succeeded = report.succeeded,
                retried = report.retried,
                dead = report.dead,
                store_errors = report.store_errors,
                "webhook jobs drained"
            );
        }
        Ok(report)
    }

    /// Run one job through RUNNING to its next state and persist each step.
    ///
    /// Handler failures become state transitions; only store errors escape.
    #[instrument(skip(self, job), fields(job_id = %job.id, event_type = %job.event_type), err)]
    pub async fn process(&self, mut job: WebhookJob, now: DateTime<Utc>) -> Result<JobStatus, StoreError> {
        if let Err(err) = job.mark_running(now) {
            warn!(error = %err, "skipping terminal job");
            return Ok(job.status);
        }
        self.store.update_job(&job).await?;

        let result = match self.handlers.get(&job.event_type) {
            Some(handler) => handler.handle(&job, now).await,
            None => Err(JobError::UnknownEventType(job.event_type.clone())),
        };

        // Transitions from RUNNING cannot fail.
        let transition = match result {
            Ok(()) => {
                debug!("job done");
                job.mark_done(now)
            }
            Err(err @ JobError::UnknownEventType(_))
                if self.config.unknown_event_policy == UnknownEventPolicy::DeadLetter =>
            {
                error!(error = %err, "unknown event type, dead-lettering");
                job.mark_dead(err.to_string(), now)
            }
            Err(err) => {
                let transition = job.record_failure(err.to_string(), &self.config.retry, now);
                if job.status == JobStatus::Dead {
                    error!(attempts = job.attempts, error = %err, "job dead after final attempt");
                } else {
                    warn!(attempts = job.attempts, next_run_at = %job.next_run_at, error = %err, "job failed, will retry");
                }
                transition
            }
        };
        if let Err(err) = transition {
            warn!(error = %err, "unexpected terminal job");
        }

        self.store.update_job(&job).await?;
        Ok(job.status)
    }

    async fn report_stuck(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let stuck = self.store.stuck_jobs(stuck_cutoff(now, self.config.stuck_threshold)).await?;
        for job in &stuck {
            warn!(job_id = %job.id, since = %job.updated_at, "job stuck in RUNNING");
        }
        Ok(stuck.len())
    }
}

/// RUNNING jobs last touched before this instant count as stuck.
pub fn stuck_cutoff(now: DateTime<Utc>, threshold: Duration) -> DateTime<Utc> {
    let threshold = chrono::Duration::from_std(threshold).unwrap_or(chrono::Duration::MAX);
    now.checked_sub_signed(threshold).unwrap_or(DateTime::<Utc>::MIN_UTC)
}
