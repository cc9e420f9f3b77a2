//! Outbox drain: each PENDING row becomes reserved/available adjustments.
//!
//! Not rescheduled with backoff; a failed row is simply picked up again on the
//! next poll until it reaches the retry ceiling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use invsync_core::InventoryItemId;

use super::types::{SyncOperation, SyncOperationStatus};
use crate::storefront::{InventoryBucket, Storefront, StorefrontError};
use crate::store::{StoreError, SyncOperationStore};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub executed: usize,
    pub retried: usize,
    pub failed: usize,
    pub store_errors: usize,
}

pub struct SyncOperationProcessor<S, F> {
    store: Arc<S>,
    storefront: F,
    batch_size: usize,
    /// Storefront SKU → item, kept for one drain.
    items: Mutex<HashMap<String, InventoryItemId>>,
}

impl<S: SyncOperationStore, F: Storefront> SyncOperationProcessor<S, F> {
    pub fn new(store: Arc<S>, storefront: F, batch_size: usize) -> Self {
        Self {
            store,
            storefront,
            batch_size,
            items: Mutex::new(HashMap::new()),
        }
    }

    #[instrument(skip(self), err)]
    pub async fn run_once(&self) -> Result<ProcessReport, StoreError> {
        if let Ok(mut items) = self.items.lock() {
            items.clear();
        }

        let mut report = ProcessReport::default();
        let pending = self.store.pending_operations(self.batch_size).await?;

        for mut op in pending {
            let applied = self.apply(&op).await;
            match &applied {
                Ok(()) => op.mark_executed(Utc::now()),
                Err(err) => op.record_failure(err.to_string()),
            }

            // A row that cannot be recorded stays PENDING and is retried next poll.
            if let Err(err) = self.store.update_operation(&op).await {
                error!(operation_id = %op.id, sku = %op.sku, error = %err, "failed to record sync operation outcome");
                report.store_errors += 1;
                continue;
            }

            match applied {
                Ok(()) => report.executed += 1,
                Err(err) if op.status == SyncOperationStatus::Failed => {
                    warn!(operation_id = %op.id, sku = %op.sku, error = %err, "sync operation failed permanently");
                    report.failed += 1;
                }
                Err(err) => {
                    warn!(operation_id = %op.id, sku = %op.sku, retry_count = op.retry_count, error = %err, "sync operation failed");
                    report.retried += 1;
                }
            }
        }

        if report != ProcessReport::default() {
            info!(
                executed = report.executed,
                retried = report.retried,
                failed = report.failed,
                store_errors = report.store_errors,
                "sync operations drained"
            );
        }
        Ok(report)
    }

    /// Push one operation's reserved and available deltas to the storefront.
    /// Zero deltas are not sent.
    #[instrument(skip(self, op), fields(operation_id = %op.id, kind = %op.kind, sku = %op.sku), err)]
    pub async fn apply(&self, op: &SyncOperation) -> Result<(), StorefrontError> {
        let item = self.resolve(op.sku.storefront_sku()).await?;
        let delta = op.inventory_delta();

        if delta.reserved != 0 {
            self.storefront.adjust(&item, InventoryBucket::Reserved, delta.reserved).await?;
        }
        if delta.available != 0 {
            self.storefront.adjust(&item, InventoryBucket::Available, delta.available).await?;
        }
        debug!(reserved = delta.reserved, available = delta.available, "inventory adjusted");
        Ok(())
    }

    async fn resolve(&self, sku: &str) -> Result<InventoryItemId, StorefrontError> {
        let cached = self.items.lock().ok().and_then(|items| items.get(sku).cloned());
        if let Some(item) = cached {
            return Ok(item);
        }
        let item = self.storefront.find_inventory_item(sku).await?;
        if let Ok(mut items) = self.items.lock() {
            items.insert(sku.to_string(), item.clone());
        }
        Ok(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storefront::BucketQuantities;
    use crate::store::{InMemoryStore, SubscriptionStore, SyncOperationStats};
    use async_trait::async_trait;
    use invsync_core::{Sku, SubscriptionId};
    use invsync_subscriptions::{SubscriptionChange, SyncIntent, SyncOperationKind};

    #[derive(Default)]
    struct RecordingStorefront {
        lookups: Mutex<Vec<String>>,
        adjustments: Mutex<Vec<(InventoryBucket, i64)>>,
        missing: Vec<&'static str>,
    }

    #[async_trait]
    impl Storefront for RecordingStorefront {
        async fn find_inventory_item(&self, sku: &str) -> Result<InventoryItemId, StorefrontError> {
            self.lookups.lock().unwrap().push(sku.to_string());
            if self.missing.contains(&sku) {
                return Err(StorefrontError::ItemNotFound(sku.to_string()));
            }
            Ok(InventoryItemId::parse(format!("gid://shopify/InventoryItem/{sku}")).unwrap())
        }

        async fn adjust(&self, _item: &InventoryItemId, bucket: InventoryBucket, delta: i64) -> Result<(), StorefrontError> {
            self.adjustments.lock().unwrap().push((bucket, delta));
            Ok(())
        }

        async fn quantities(&self, _item: &InventoryItemId) -> Result<BucketQuantities, StorefrontError> {
            Ok(BucketQuantities::default())
        }
    }

    fn op(kind: SyncOperationKind, sku: &str, quantity: i64) -> SyncOperation {
        SyncOperation::from_intent(
            SyncIntent::new(SubscriptionId::parse("S1").unwrap(), kind, Sku::parse(sku).unwrap(), quantity),
            Utc::now(),
        )
    }

    async fn store_with(ops: Vec<SyncOperation>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.commit(SubscriptionChange::Unchanged, ops).await.unwrap();
        store
    }

    #[tokio::test]
    async fn operations_map_to_bucket_adjustments() {
        let store = store_with(vec![
            op(SyncOperationKind::Insert, "KIT01_BLUE", 2),
            op(SyncOperationKind::Delete, "KIT01_RED", 1),
            op(SyncOperationKind::HardDecrement, "KIT02", 4),
        ])
        .await;
        let storefront = Arc::new(RecordingStorefront::default());
        let processor = SyncOperationProcessor::new(store.clone(), storefront.clone(), 100);

        let report = processor.run_once().await.unwrap();
        assert_eq!(report.executed, 3);

        assert_eq!(
            *storefront.adjustments.lock().unwrap(),
            vec![
                (InventoryBucket::Reserved, 2),
                (InventoryBucket::Available, -2),
                (InventoryBucket::Reserved, -1),
                (InventoryBucket::Available, 1),
                // hard decrement leaves available untouched
                (InventoryBucket::Reserved, -4),
            ]
        );
        // Suffix stripped and the lookup cached across variants.
        assert_eq!(*storefront.lookups.lock().unwrap(), vec!["KIT01", "KIT02"]);

        let stats = store.operation_stats().await.unwrap();
        assert_eq!(stats.executed, 3);
    }

    #[tokio::test]
    async fn missing_item_fails_after_three_polls() {
        let store = store_with(vec![op(SyncOperationKind::Insert, "GHOST", 1)]).await;
        let storefront = Arc::new(RecordingStorefront {
            missing: vec!["GHOST"],
            ..Default::default()
        });
        let processor = SyncOperationProcessor::new(store.clone(), storefront.clone(), 100);

        assert_eq!(processor.run_once().await.unwrap().retried, 1);
        assert_eq!(processor.run_once().await.unwrap().retried, 1);
        assert_eq!(processor.run_once().await.unwrap().failed, 1);
        // Never picked up again.
        assert_eq!(processor.run_once().await.unwrap(), ProcessReport::default());

        let ops = store.operations().unwrap();
        assert_eq!(ops[0].status, SyncOperationStatus::Failed);
        assert_eq!(ops[0].retry_count, 3);
        assert!(storefront.adjustments.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_delta_sends_nothing() {
        let store = store_with(vec![op(SyncOperationKind::Delta, "KIT01", 0)]).await;
        let storefront = Arc::new(RecordingStorefront::default());
        let processor = SyncOperationProcessor::new(store, storefront.clone(), 100);

        assert_eq!(processor.run_once().await.unwrap().executed, 1);
        assert!(storefront.adjustments.lock().unwrap().is_empty());
    }

    /// Refuses to record the outcome of one operation.
    struct RefusingStore {
        inner: Arc<InMemoryStore>,
        refuse: invsync_core::SyncOperationId,
    }

    #[async_trait]
    impl SyncOperationStore for RefusingStore {
        async fn pending_operations(&self, limit: usize) -> Result<Vec<SyncOperation>, StoreError> {
            self.inner.pending_operations(limit).await
        }

        async fn update_operation(&self, operation: &SyncOperation) -> Result<(), StoreError> {
            if operation.id == self.refuse {
                return Err(StoreError::Storage("write rejected".into()));
            }
            self.inner.update_operation(operation).await
        }

        async fn operation_stats(&self) -> Result<SyncOperationStats, StoreError> {
            self.inner.operation_stats().await
        }
    }

    #[tokio::test]
    async fn unrecordable_row_does_not_stop_the_batch() {
        let first = op(SyncOperationKind::Insert, "KIT01", 1);
        let second = op(SyncOperationKind::Insert, "KIT02", 1);
        let inner = store_with(vec![first.clone(), second.clone()]).await;
        let store = Arc::new(RefusingStore {
            inner: inner.clone(),
            refuse: first.id,
        });
        let processor = SyncOperationProcessor::new(store, Arc::new(RecordingStorefront::default()), 100);

        let report = processor.run_once().await.unwrap();
        assert_eq!((report.executed, report.store_errors), (1, 1));

        let ops = inner.operations().unwrap();
        let status_of = |id| ops.iter().find(|o| o.id == id).map(|o| o.status);
        assert_eq!(status_of(first.id), Some(SyncOperationStatus::Pending));
        assert_eq!(status_of(second.id), Some(SyncOperationStatus::Executed));
    }
}
