//! In-memory store: every table behind one `RwLock`, so `commit` is atomic.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use invsync_core::{JobId, Sku, SubscriptionId};
use invsync_subscriptions::{ControlledSkus, Customer, Subscription, SubscriptionChange};

use super::{
    ControlledSkuCatalog, IdempotencyStore, JobStats, JobStore, StoreError, SubscriptionStore, SyncOperationStats,
    SyncOperationStore,
};
use crate::idempotency::{CleanupStrategy, WebhookIdempotency};
use crate::jobs::{JobStatus, WebhookJob};
use crate::sync::SyncOperation;

#[derive(Debug, Default)]
struct Tables {
    controlled_skus: HashSet<Sku>,
    customers: HashMap<String, Customer>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    jobs: BTreeMap<JobId, WebhookJob>,
    idempotency: HashMap<String, WebhookIdempotency>,
    /// Insertion order is creation order.
    operations: Vec<SyncOperation>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_controlled_skus(skus: impl IntoIterator<Item = Sku>) -> Self {
        let store = Self::new();
        if let Ok(mut tables) = store.tables.write() {
            tables.controlled_skus.extend(skus);
        }
        store
    }

    pub fn add_controlled_sku(&self, sku: Sku) -> Result<(), StoreError> {
        self.write()?.controlled_skus.insert(sku);
        Ok(())
    }

    /// Simulate an outage: every operation fails with `StoreError::Storage`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of the outbox in creation order.
    pub fn operations(&self) -> Result<Vec<SyncOperation>, StoreError> {
        Ok(self.read()?.operations.clone())
    }

    pub fn customer(&self, email: &str) -> Result<Option<Customer>, StoreError> {
        Ok(self.read()?.customers.get(email).cloned())
    }

    pub fn subscription_count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.subscriptions.len())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("store unavailable".into()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.check_available()?;
        self.tables
            .read()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.check_available()?;
        self.tables
            .write()
            .map_err(|_| StoreError::Storage("lock poisoned".into()))
    }
}

#[async_trait]
impl SubscriptionStore for InMemoryStore {
    async fn load_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StoreError> {
        Ok(self.read()?.subscriptions.get(id).cloned())
    }

    async fn commit(&self, change: SubscriptionChange, operations: Vec<SyncOperation>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match change {
            SubscriptionChange::Unchanged => {}
            SubscriptionChange::Upsert(subscription) => {
                if let Some(customer) = &subscription.customer {
                    tables.customers.insert(customer.email.clone(), customer.clone());
                }
                tables.subscriptions.insert(subscription.id.clone(), subscription);
            }
            SubscriptionChange::Remove(id) => {
                tables.subscriptions.remove(&id);
            }
            SubscriptionChange::RemoveOrders {
                subscription_id,
                recurrences,
            } => {
                if let Some(subscription) = tables.subscriptions.get_mut(&subscription_id) {
                    for recurrence in recurrences {
                        subscription.orders.remove(&recurrence);
                    }
                }
            }
        }
        tables.operations.extend(operations);
        Ok(())
    }
}

#[async_trait]
impl ControlledSkuCatalog for InMemoryStore {
    async fn controlled_skus(&self) -> Result<ControlledSkus, StoreError> {
        Ok(self.read()?.controlled_skus.iter().cloned().collect())
    }
}

#[async_trait]
impl JobStore for InMemoryStore {
    async fn enqueue_job(&self, job: &WebhookJob) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.jobs.contains_key(&job.id) {
            return Err(StoreError::AlreadyExists(job.id.to_string()));
        }
        tables.jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn job(&self, id: JobId) -> Result<Option<WebhookJob>, StoreError> {
        Ok(self.read()?.jobs.get(&id).cloned())
    }

    async fn update_job(&self, job: &WebhookJob) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.jobs.get_mut(&job.id) {
            Some(slot) => {
                *slot = job.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(job.id.to_string())),
        }
    }

    async fn ready_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookJob>, StoreError> {
        let tables = self.read()?;
        let mut ready: Vec<_> = tables.jobs.values().filter(|j| j.is_ready(now)).cloned().collect();
        ready.sort_by_key(|j| (j.next_run_at, j.id));
        ready.truncate(limit);
        Ok(ready)
    }

    async fn job_stats(&self) -> Result<JobStats, StoreError> {
        let tables = self.read()?;
        let mut stats = JobStats::default();
        for job in tables.jobs.values() {
            stats.record(job.status, 1);
        }
        Ok(stats)
    }

    async fn stuck_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<WebhookJob>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running && j.updated_at < started_before)
            .cloned()
            .collect())
    }

    async fn dead_jobs(&self, limit: usize) -> Result<Vec<WebhookJob>, StoreError> {
        let tables = self.read()?;
        let mut dead: Vec<_> = tables
            .jobs
            .values()
            .filter(|j| matches!(j.status, JobStatus::Dead | JobStatus::Failed))
            .cloned()
            .collect();
        dead.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        dead.truncate(limit);
        Ok(dead)
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryStore {
    async fn find_idempotency(&self, signature: &str) -> Result<Option<WebhookIdempotency>, StoreError> {
        Ok(self.read()?.idempotency.get(signature).cloned())
    }

    async fn insert_idempotency(&self, record: &WebhookIdempotency) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        if tables.idempotency.contains_key(&record.signature) {
            return Err(StoreError::AlreadyExists(record.signature.clone()));
        }
        tables.idempotency.insert(record.signature.clone(), record.clone());
        Ok(())
    }

    async fn touch_idempotency(&self, signature: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.idempotency.get_mut(signature) {
            Some(record) => {
                record.last_processed_at = now;
                Ok(())
            }
            None => Err(StoreError::NotFound(signature.to_string())),
        }
    }

    async fn delete_expired_idempotency(
        &self,
        created_before: DateTime<Utc>,
        strategy: CleanupStrategy,
    ) -> Result<u64, StoreError> {
        let mut tables = self.write()?;
        let Tables { idempotency, jobs, .. } = &mut *tables;
        let before = idempotency.len();
        idempotency.retain(|_, record| {
            if record.created_at >= created_before {
                return true;
            }
            match strategy {
                CleanupStrategy::Aggressive => false,
                CleanupStrategy::Conservative => {
                    jobs.get(&record.job_id).map(|j| j.status) != Some(JobStatus::Done)
                }
            }
        });
        Ok((before - idempotency.len()) as u64)
    }
}

#[async_trait]
impl SyncOperationStore for InMemoryStore {
    async fn pending_operations(&self, limit: usize) -> Result<Vec<SyncOperation>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .operations
            .iter()
            .filter(|op| op.is_pending())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn update_operation(&self, operation: &SyncOperation) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        match tables.operations.iter_mut().find(|op| op.id == operation.id) {
            Some(slot) => {
                *slot = operation.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(operation.id.to_string())),
        }
    }

    async fn operation_stats(&self) -> Result<SyncOperationStats, StoreError> {
        let tables = self.read()?;
        let mut stats = SyncOperationStats::default();
        for op in &tables.operations {
            stats.record(op.status, 1);
        }
        Ok(stats)
    }
}
