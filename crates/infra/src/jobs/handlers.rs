use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use invsync_subscriptions::{SubscriptionUpdate, plan_webhook_update};

use super::types::WebhookJob;
use super::worker::{JobError, JobHandler};
use crate::store::SubscriptionStore;
use crate::sync::SyncOperation;

/// Applies a `subscription_update` notification to the local mirror.
pub struct SubscriptionUpdateHandler<S> {
    store: Arc<S>,
}

impl<S: SubscriptionStore> SubscriptionUpdateHandler<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: SubscriptionStore> JobHandler for SubscriptionUpdateHandler<S> {
    async fn handle(&self, job: &WebhookJob, now: DateTime<Utc>) -> Result<(), JobError> {
        let payload: Value =
            serde_json::from_str(&job.payload).map_err(|e| JobError::InvalidPayload(e.to_string()))?;
        let update = SubscriptionUpdate::from_payload(&payload).map_err(|e| JobError::InvalidPayload(e.to_string()))?;

        let local = self.store.load_subscription(&update.subscription_id).await?;
        if local.is_none() {
            debug!(subscription_id = %update.subscription_id, "untracked subscription, ignoring");
            return Ok(());
        }

        let plan = plan_webhook_update(local.as_ref(), &update);
        if plan.is_noop() {
            debug!(
                subscription_id = %update.subscription_id,
                status = update.status_code,
                "nothing to change"
            );
            return Ok(());
        }

        let operations: Vec<_> = plan
            .intents
            .into_iter()
            .map(|intent| SyncOperation::from_intent(intent, now))
            .collect();
        info!(
            subscription_id = %update.subscription_id,
            status = update.status_code,
            recurrence = update.recurrence,
            operations = operations.len(),
            "applying subscription update"
        );
        self.store.commit(plan.change, operations).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use invsync_core::{Sku, SubscriptionId};
    use invsync_subscriptions::{LineItem, Order, Subscription, SubscriptionStatus, SyncOperationKind};

    fn order(recurrence: u32, quantity: i64) -> Order {
        let mut order = Order::new(recurrence);
        order.stock_released = false;
        order.products.push(LineItem {
            sku: Sku::parse("KIT01").unwrap(),
            quantity,
            unit_price: None,
            total_price: None,
        });
        order
    }

    async fn seeded() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let mut sub = Subscription::new(SubscriptionId::parse("S1").unwrap(), SubscriptionStatus::PaymentPending, Utc::now());
        sub.insert_order(order(2, 1));
        sub.insert_order(order(3, 2));
        store
            .commit(invsync_subscriptions::SubscriptionChange::Upsert(sub), vec![])
            .await
            .unwrap();
        store
    }

    fn job(payload: &str) -> WebhookJob {
        WebhookJob::new("pagstream", "subscription_update", None, payload, Utc::now())
    }

    #[tokio::test]
    async fn paid_latest_recurrence_releases_everything() {
        let store = seeded().await;
        let handler = SubscriptionUpdateHandler::new(store.clone());

        handler
            .handle(&job(r#"{"subscription":"S1","status":1,"number_recurrences":3}"#), Utc::now())
            .await
            .unwrap();

        let id = SubscriptionId::parse("S1").unwrap();
        assert!(store.load_subscription(&id).await.unwrap().is_none());
        let ops = store.operations().unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().all(|op| op.kind == SyncOperationKind::Delete));
        assert_eq!(ops.iter().map(|op| op.quantity).sum::<i64>(), 3);
    }

    #[tokio::test]
    async fn untracked_subscription_is_a_no_op() {
        let store = seeded().await;
        let handler = SubscriptionUpdateHandler::new(store.clone());
        handler
            .handle(&job(r#"{"subscription":"S9","status":"3","number_recurrences":"1"}"#), Utc::now())
            .await
            .unwrap();
        assert!(store.operations().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_payload_is_a_job_failure() {
        let store = seeded().await;
        let handler = SubscriptionUpdateHandler::new(store);
        for payload in ["not json", r#"{"status":1,"number_recurrences":3}"#, r#"{"subscription":"S1","status":"x"}"#] {
            assert!(matches!(
                handler.handle(&job(payload), Utc::now()).await,
                Err(JobError::InvalidPayload(_))
            ));
        }
    }
}
