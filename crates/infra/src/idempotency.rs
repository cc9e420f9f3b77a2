//! Webhook de-duplication by signature, and its housekeeping.
//!
//! The job is written before the idempotency record. A crash between the two
//! leaves at most one duplicate job on the notifier's retry, which is harmless
//! because job handlers recompute deltas from current state.

use core::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use invsync_core::{DomainError, JobId, SubscriptionId};

use crate::jobs::WebhookJob;
use crate::store::{IdempotencyStore, JobStore, StoreError};

/// Dedup key row: one per unique webhook signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookIdempotency {
    pub signature: String,
    pub source: String,
    pub event_type: String,
    pub subscription_id: Option<SubscriptionId>,
    pub job_id: JobId,
    pub created_at: DateTime<Utc>,
    pub last_processed_at: DateTime<Utc>,
}

/// A verified notification ready to be queued.
#[derive(Debug, Clone)]
pub struct IncomingWebhook {
    pub signature: String,
    pub source: String,
    pub event_type: String,
    pub subscription_id: Option<SubscriptionId>,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    FirstSeen { job_id: JobId },
    AlreadySeen { job_id: JobId },
}

impl Registration {
    pub fn job_id(&self) -> JobId {
        match self {
            Registration::FirstSeen { job_id } | Registration::AlreadySeen { job_id } => *job_id,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, Registration::AlreadySeen { .. })
    }
}

pub struct IdempotencyGuard<S> {
    store: Arc<S>,
}

impl<S> Clone for IdempotencyGuard<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: JobStore + IdempotencyStore> IdempotencyGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    #[instrument(skip(self, webhook), fields(source = %webhook.source, event_type = %webhook.event_type), err)]
    pub async fn register(&self, webhook: IncomingWebhook, now: DateTime<Utc>) -> Result<Registration, StoreError> {
        if let Some(existing) = self.store.find_idempotency(&webhook.signature).await? {
            self.store.touch_idempotency(&webhook.signature, now).await?;
            debug!(job_id = %existing.job_id, "duplicate webhook");
            return Ok(Registration::AlreadySeen {
                job_id: existing.job_id,
            });
        }

        let job = WebhookJob::new(
            webhook.source.clone(),
            webhook.event_type.clone(),
            webhook.subscription_id.clone(),
            webhook.payload,
            now,
        );
        self.store.enqueue_job(&job).await?;

        let record = WebhookIdempotency {
            signature: webhook.signature,
            source: webhook.source,
            event_type: webhook.event_type,
            subscription_id: webhook.subscription_id,
            job_id: job.id,
            created_at: now,
            last_processed_at: now,
        };

        match self.store.insert_idempotency(&record).await {
            Ok(()) => {
                info!(job_id = %job.id, "webhook queued");
                Ok(Registration::FirstSeen { job_id: job.id })
            }
            // Concurrent delivery of the same notification won the insert.
            Err(StoreError::AlreadyExists(_)) => {
                let winner = self
                    .store
                    .find_idempotency(&record.signature)
                    .await?
                    .map(|r| r.job_id)
                    .unwrap_or(job.id);
                self.store.touch_idempotency(&record.signature, now).await?;
                warn!(job_id = %job.id, winner = %winner, "lost idempotency race, duplicate job left queued");
                Ok(Registration::AlreadySeen { job_id: winner })
            }
            Err(err) => Err(err),
        }
    }
}

/// Which expired idempotency records cleanup may delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupStrategy {
    /// Only records whose job finished (DONE).
    #[default]
    Conservative,
    /// Every expired record.
    Aggressive,
}

impl CleanupStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            CleanupStrategy::Conservative => "conservative",
            CleanupStrategy::Aggressive => "aggressive",
        }
    }
}

impl FromStr for CleanupStrategy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(CleanupStrategy::Conservative),
            "aggressive" => Ok(CleanupStrategy::Aggressive),
            other => Err(DomainError::unknown_code("cleanup strategy", other)),
        }
    }
}

/// Periodic deletion of idempotency records older than the TTL. Jobs are kept.
pub struct IdempotencyCleanup<S> {
    store: Arc<S>,
    ttl: Duration,
    strategy: CleanupStrategy,
}

impl<S: IdempotencyStore> IdempotencyCleanup<S> {
    pub fn new(store: Arc<S>, ttl: Duration, strategy: CleanupStrategy) -> Self {
        Self { store, ttl, strategy }
    }

    #[instrument(skip(self), fields(strategy = self.strategy.as_str()), err)]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(ttl).unwrap_or(DateTime::<Utc>::MIN_UTC);
        let deleted = self.store.delete_expired_idempotency(cutoff, self.strategy).await?;
        if deleted > 0 {
            info!(deleted, %cutoff, "expired idempotency records removed");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobStatus;
    use crate::store::InMemoryStore;

    fn webhook(signature: &str) -> IncomingWebhook {
        IncomingWebhook {
            signature: signature.to_string(),
            source: "pagstream".into(),
            event_type: "subscription_update".into(),
            subscription_id: Some(SubscriptionId::parse("S1").unwrap()),
            payload: r#"{"subscription":"S1","status":1,"number_recurrences":3}"#.into(),
        }
    }

    #[tokio::test]
    async fn second_registration_creates_no_new_job() {
        let store = Arc::new(InMemoryStore::new());
        let guard = IdempotencyGuard::new(store.clone());
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(30);

        let first = guard.register(webhook("abc"), t0).await.unwrap();
        let second = guard.register(webhook("abc"), t1).await.unwrap();

        assert!(!first.is_duplicate());
        assert!(second.is_duplicate());
        assert_eq!(first.job_id(), second.job_id());
        assert_eq!(store.job_stats().await.unwrap().total(), 1);

        let record = store.find_idempotency("abc").await.unwrap().unwrap();
        assert_eq!(record.created_at, t0);
        assert_eq!(record.last_processed_at, t1);
    }

    #[tokio::test]
    async fn distinct_signatures_queue_distinct_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let guard = IdempotencyGuard::new(store.clone());
        let now = Utc::now();

        let a = guard.register(webhook("a"), now).await.unwrap();
        let b = guard.register(webhook("b"), now).await.unwrap();
        assert_ne!(a.job_id(), b.job_id());

        let job = store.job(a.job_id()).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.event_type, "subscription_update");
        assert_eq!(job.next_run_at, now);
    }

    #[tokio::test]
    async fn conservative_cleanup_keeps_records_of_unfinished_jobs() {
        let store = Arc::new(InMemoryStore::new());
        let guard = IdempotencyGuard::new(store.clone());
        let old = Utc::now() - chrono::Duration::days(40);

        let done = guard.register(webhook("done"), old).await.unwrap();
        guard.register(webhook("pending"), old).await.unwrap();
        guard.register(webhook("fresh"), Utc::now()).await.unwrap();

        let mut job = store.job(done.job_id()).await.unwrap().unwrap();
        job.mark_done(old).unwrap();
        store.update_job(&job).await.unwrap();

        let ttl = Duration::from_secs(720 * 3_600);
        let conservative = IdempotencyCleanup::new(store.clone(), ttl, CleanupStrategy::Conservative);
        assert_eq!(conservative.run_once(Utc::now()).await.unwrap(), 1);
        assert!(store.find_idempotency("done").await.unwrap().is_none());
        assert!(store.find_idempotency("pending").await.unwrap().is_some());

        let aggressive = IdempotencyCleanup::new(store.clone(), ttl, CleanupStrategy::Aggressive);
        assert_eq!(aggressive.run_once(Utc::now()).await.unwrap(), 1);
        assert!(store.find_idempotency("pending").await.unwrap().is_none());
        assert!(store.find_idempotency("fresh").await.unwrap().is_some());

        // Jobs survive cleanup.
        assert_eq!(store.job_stats().await.unwrap().total(), 3);
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("Aggressive".parse::<CleanupStrategy>().unwrap(), CleanupStrategy::Aggressive);
        assert!("sometimes".parse::<CleanupStrategy>().is_err());
    }
}
