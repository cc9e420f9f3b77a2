//! Persistence traits and their implementations.
//!
//! - [`InMemoryStore`]: one lock-guarded table set (development default, tests)
//! - [`PgStore`]: Postgres via `sqlx`
//!
//! Components hold an `Arc<S>` of a single store type implementing every trait
//! they need.

mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use invsync_core::{JobId, SubscriptionId};
use invsync_subscriptions::{ControlledSkus, Subscription, SubscriptionChange};

use crate::idempotency::{CleanupStrategy, WebhookIdempotency};
use crate::jobs::{JobStatus, WebhookJob};
use crate::sync::{SyncOperation, SyncOperationStatus};

pub use memory::InMemoryStore;
pub use postgres::PgStore;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Local Subscription → Order → LineItem mirror.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn load_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StoreError>;

    /// Apply one reconciliation unit atomically: the entity change (children
    /// before parents) and the sync operations it emitted.
    async fn commit(&self, change: SubscriptionChange, operations: Vec<SyncOperation>) -> Result<(), StoreError>;
}

/// Controlled-SKU registry, read as a membership table.
#[async_trait]
pub trait ControlledSkuCatalog: Send + Sync {
    async fn controlled_skus(&self) -> Result<ControlledSkus, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobStats {
    pub pending: u64,
    pub running: u64,
    pub done: u64,
    pub failed: u64,
    pub dead: u64,
}

impl JobStats {
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Done => self.done += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Dead => self.dead += count,
        }
    }

    pub fn total(&self) -> u64 {
        self.pending + self.running + self.done + self.failed + self.dead
    }
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn enqueue_job(&self, job: &WebhookJob) -> Result<(), StoreError>;

    async fn job(&self, id: JobId) -> Result<Option<WebhookJob>, StoreError>;

    async fn update_job(&self, job: &WebhookJob) -> Result<(), StoreError>;

    /// PENDING jobs with `next_run_at <= now`, oldest `next_run_at` first.
    async fn ready_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookJob>, StoreError>;

    async fn job_stats(&self) -> Result<JobStats, StoreError>;

    /// RUNNING jobs last touched before `started_before`.
    async fn stuck_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<WebhookJob>, StoreError>;

    /// Most recently updated DEAD or FAILED jobs.
    async fn dead_jobs(&self, limit: usize) -> Result<Vec<WebhookJob>, StoreError>;
}

#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    async fn find_idempotency(&self, signature: &str) -> Result<Option<WebhookIdempotency>, StoreError>;

    /// `StoreError::AlreadyExists` when the signature is taken.
    async fn insert_idempotency(&self, record: &WebhookIdempotency) -> Result<(), StoreError>;

    async fn touch_idempotency(&self, signature: &str, now: DateTime<Utc>) -> Result<(), StoreError>;

    /// Delete records created before the cutoff; returns the number removed.
    async fn delete_expired_idempotency(
        &self,
        created_before: DateTime<Utc>,
        strategy: CleanupStrategy,
    ) -> Result<u64, StoreError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncOperationStats {
    pub pending: u64,
    pub executed: u64,
    pub failed: u64,
}

impl SyncOperationStats {
    pub fn record(&mut self, status: SyncOperationStatus, count: u64) {
        match status {
            SyncOperationStatus::Pending => self.pending += count,
            SyncOperationStatus::Executed => self.executed += count,
            SyncOperationStatus::Failed => self.failed += count,
        }
    }
}

#[async_trait]
pub trait SyncOperationStore: Send + Sync {
    /// PENDING operations in creation order.
    async fn pending_operations(&self, limit: usize) -> Result<Vec<SyncOperation>, StoreError>;

    async fn update_operation(&self, operation: &SyncOperation) -> Result<(), StoreError>;

    async fn operation_stats(&self) -> Result<SyncOperationStats, StoreError>;
}
