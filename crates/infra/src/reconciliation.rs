//! Periodic reconciliation sweep against the billing provider.
//!
//! One cycle runs entirely under the billing-provider gate. Listing happens
//! before any persistence, so a failed list aborts the cycle with local state
//! untouched. After that each subscription is its own unit: a failed detail
//! fetch or commit skips that subscription only.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use invsync_core::SubscriptionId;
use invsync_subscriptions::{ReconcilePlan, SubscriptionChange, SubscriptionStatus, plan_drop, plan_reconciliation};

use crate::billing::{BackoffPolicy, BillingProvider, jitter};
use crate::gate::ApiGate;
use crate::store::{ControlledSkuCatalog, SubscriptionStore};
use crate::sync::SyncOperation;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub listed: usize,
    pub cancelled_dropped: usize,
    pub fetched: usize,
    pub fetch_failed: usize,
    pub upserted: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub operations: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Gate not acquired in time; try next interval.
    Skipped,
    /// Nothing was persisted.
    Aborted(String),
    Completed(SweepReport),
}

pub struct ReconciliationSweep<S, B> {
    store: Arc<S>,
    billing: B,
    gate: ApiGate,
    gate_timeout: Duration,
    pacing: BackoffPolicy,
}

impl<S, B> ReconciliationSweep<S, B>
where
    S: SubscriptionStore + ControlledSkuCatalog,
    B: BillingProvider,
{
    pub fn new(store: Arc<S>, billing: B, gate: ApiGate, gate_timeout: Duration, pacing: BackoffPolicy) -> Self {
        Self {
            store,
            billing,
            gate,
            gate_timeout,
            pacing,
        }
    }

    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleOutcome {
        let permit = match self.gate.acquire("reconciliation-sweep", self.gate_timeout).await {
            Ok(permit) => permit,
            Err(err) => {
                info!(error = %err, "gate busy, skipping sweep");
                return CycleOutcome::Skipped;
            }
        };

        let catalog = match self.store.controlled_skus().await {
            Ok(catalog) => catalog,
            Err(err) => return abort(format!("controlled SKUs unavailable: {err}")),
        };
        if catalog.is_empty() {
            warn!("no controlled SKUs registered, no order will reserve stock");
        } else {
            debug!(controlled_skus = catalog.len(), "controlled SKUs loaded");
        }

        let mut listed = Vec::with_capacity(SubscriptionStatus::SWEPT.len());
        for (i, status) in SubscriptionStatus::SWEPT.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(jitter(self.pacing.page_delay)).await;
            }
            match self.billing.fetch_ids_by_status(&permit, status).await {
                Some(ids) => listed.push((status, ids)),
                None => return abort(format!("listing {status} subscriptions failed")),
            }
        }

        let mut report = SweepReport {
            listed: listed.iter().map(|(_, ids)| ids.len()).sum(),
            ..SweepReport::default()
        };

        let mut cancelled = HashSet::new();
        for (status, ids) in &listed {
            if *status != SubscriptionStatus::Cancelled {
                continue;
            }
            for id in ids {
                cancelled.insert(id.clone());
                let local = match self.store.load_subscription(id).await {
                    Ok(Some(local)) => local,
                    Ok(None) => continue,
                    Err(err) => {
                        error!(subscription_id = %id, error = %err, "failed to load subscription");
                        report.failed += 1;
                        continue;
                    }
                };
                if self.commit(id, plan_drop(&local), &mut report).await {
                    report.cancelled_dropped += 1;
                }
            }
        }

        let mut seen: HashSet<SubscriptionId> = HashSet::new();
        let remaining: Vec<&SubscriptionId> = listed
            .iter()
            .filter(|(status, _)| *status != SubscriptionStatus::Cancelled)
            .flat_map(|(_, ids)| ids)
            .filter(|id| !cancelled.contains(*id) && seen.insert((*id).clone()))
            .collect();

        for (i, id) in remaining.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(jitter(self.pacing.request_delay)).await;
            }
            let Some(doc) = self.billing.fetch_by_id(&permit, id).await else {
                warn!(subscription_id = %id, "detail fetch failed, skipping this cycle");
                report.fetch_failed += 1;
                continue;
            };
            report.fetched += 1;

            let local = match self.store.load_subscription(id).await {
                Ok(local) => local,
                Err(err) => {
                    error!(subscription_id = %id, error = %err, "failed to load subscription");
                    report.failed += 1;
                    continue;
                }
            };
            match plan_reconciliation(local.as_ref(), &doc, &catalog, Utc::now()) {
                Ok(plan) => {
                    self.commit(id, plan, &mut report).await;
                }
                Err(err) => {
                    warn!(subscription_id = %id, error = %err, "unusable subscription document");
                    report.failed += 1;
                }
            }
        }

        info!(
            listed = report.listed,
            fetched = report.fetched,
            fetch_failed = report.fetch_failed,
            upserted = report.upserted,
            removed = report.removed,
            operations = report.operations,
            "reconciliation sweep completed"
        );
        CycleOutcome::Completed(report)
    }

    /// Persist one unit. Returns whether anything was written.
    async fn commit(&self, id: &SubscriptionId, plan: ReconcilePlan, report: &mut SweepReport) -> bool {
        if plan.is_noop() {
            report.unchanged += 1;
            return false;
        }
        let now = Utc::now();
        let operations: Vec<_> = plan
            .intents
            .into_iter()
            .map(|intent| SyncOperation::from_intent(intent, now))
            .collect();
        let emitted = operations.len();
        let removes = !matches!(plan.change, SubscriptionChange::Upsert(_) | SubscriptionChange::Unchanged);

        match self.store.commit(plan.change, operations).await {
            Ok(()) => {
                debug!(subscription_id = %id, operations = emitted, "subscription reconciled");
                report.operations += emitted;
                if removes {
                    report.removed += 1;
                } else {
                    report.upserted += 1;
                }
                true
            }
            Err(err) => {
                error!(subscription_id = %id, error = %err, "failed to persist reconciliation");
                report.failed += 1;
                false
            }
        }
    }
}

fn abort(reason: String) -> CycleOutcome {
    warn!(%reason, "reconciliation sweep aborted");
    CycleOutcome::Aborted(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::ApiPermit;
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use invsync_core::Sku;
    use invsync_subscriptions::{LineItem, Order, ProviderSubscription, Subscription, SubscriptionChange, SyncOperationKind};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeBilling {
        lists: HashMap<SubscriptionStatus, Option<Vec<&'static str>>>,
        docs: HashMap<&'static str, serde_json::Value>,
        detail_calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BillingProvider for FakeBilling {
        async fn fetch_page(&self, _: &ApiPermit, _: SubscriptionStatus, _: u32) -> Option<Vec<SubscriptionId>> {
            unreachable!("sweep lists whole statuses")
        }

        async fn fetch_ids_by_status(&self, _: &ApiPermit, status: SubscriptionStatus) -> Option<Vec<SubscriptionId>> {
            match self.lists.get(&status) {
                Some(Some(ids)) => Some(ids.iter().map(|id| SubscriptionId::parse(*id).unwrap()).collect()),
                Some(None) => None,
                None => Some(Vec::new()),
            }
        }

        async fn fetch_by_id(&self, _: &ApiPermit, id: &SubscriptionId) -> Option<ProviderSubscription> {
            self.detail_calls.lock().unwrap().push(id.to_string());
            self.docs
                .get(id.as_str())
                .map(|doc| serde_json::from_value(doc.clone()).unwrap())
        }
    }

    fn item(sku: &str, quantity: i64) -> LineItem {
        LineItem {
            sku: Sku::parse(sku).unwrap(),
            quantity,
            unit_price: None,
            total_price: None,
        }
    }

    fn reserved(recurrence: u32, items: Vec<LineItem>) -> Order {
        let mut order = Order::new(recurrence);
        order.stock_released = false;
        order.products = items;
        order
    }

    async fn store_with(subs: Vec<(&str, Vec<Order>)>) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::with_controlled_skus([
            Sku::parse("KIT01").unwrap(),
            Sku::parse("KIT02").unwrap(),
        ]));
        for (id, orders) in subs {
            let mut sub = Subscription::new(SubscriptionId::parse(id).unwrap(), SubscriptionStatus::Active, Utc::now());
            for order in orders {
                sub.insert_order(order);
            }
            store.commit(SubscriptionChange::Upsert(sub), vec![]).await.unwrap();
        }
        store
    }

    fn sweep(store: Arc<InMemoryStore>, billing: FakeBilling) -> ReconciliationSweep<InMemoryStore, FakeBilling> {
        ReconciliationSweep::new(store, billing, ApiGate::new(), Duration::from_secs(1), BackoffPolicy::default())
    }

    fn completed(outcome: CycleOutcome) -> SweepReport {
        match outcome {
            CycleOutcome::Completed(report) => report,
            other => panic!("expected completed cycle, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_subscription_releases_everything() {
        let store = store_with(vec![("S1", vec![reserved(7, vec![item("KIT01", 3), item("KIT02", 5)])])]).await;
        let billing = FakeBilling {
            lists: HashMap::from([(SubscriptionStatus::Cancelled, Some(vec!["S1"]))]),
            ..Default::default()
        };

        let report = completed(sweep(store.clone(), billing).run_cycle().await);
        assert_eq!(report.cancelled_dropped, 1);

        let ops = store.operations().unwrap();
        let mut released: Vec<_> = ops.iter().map(|op| (op.kind, op.sku.to_string(), op.quantity)).collect();
        released.sort();
        assert_eq!(
            released,
            vec![
                (SyncOperationKind::Delete, "KIT01".to_string(), 3),
                (SyncOperationKind::Delete, "KIT02".to_string(), 5),
            ]
        );
        assert!(store.load_subscription(&SubscriptionId::parse("S1").unwrap()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn quantity_change_emits_single_delta() {
        let store = store_with(vec![(
            "S2",
            vec![
                reserved(4, vec![item("KIT01", 1)]),
                reserved(5, vec![item("KIT01", 1), item("KIT02", 2)]),
            ],
        )])
        .await;
        let billing = FakeBilling {
            lists: HashMap::from([(SubscriptionStatus::Active, Some(vec!["S2"]))]),
            docs: HashMap::from([(
                "S2",
                json!({
                    "subscription": "S2",
                    "status": 1,
                    "number_recurrences": 5,
                    "recurrences": [
                        {"number_recurrence": 4, "payment_date": null, "products": [{"sku": "KIT01", "quantity": 1}]},
                        {"number_recurrence": 5, "payment_date": "", "products": [
                            {"sku": "KIT01", "quantity": 2},
                            {"sku": "KIT02", "quantity": 2}
                        ]}
                    ]
                }),
            )]),
            ..Default::default()
        };

        let report = completed(sweep(store.clone(), billing).run_cycle().await);
        assert_eq!(report.operations, 1);

        let ops = store.operations().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, SyncOperationKind::Delta);
        assert_eq!(ops[0].sku.as_str(), "KIT01");
        assert_eq!(ops[0].quantity, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_listing_aborts_before_any_write() {
        let store = store_with(vec![("S1", vec![reserved(1, vec![item("KIT01", 1)])])]).await;
        let billing = FakeBilling {
            lists: HashMap::from([
                (SubscriptionStatus::Cancelled, Some(vec!["S1"])),
                (SubscriptionStatus::PaymentPending, None),
            ]),
            ..Default::default()
        };

        let outcome = sweep(store.clone(), billing).run_cycle().await;
        assert!(matches!(outcome, CycleOutcome::Aborted(_)));
        assert!(store.operations().unwrap().is_empty());
        assert_eq!(store.subscription_count().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_detail_skips_only_that_subscription() {
        let store = store_with(vec![]).await;
        let billing = FakeBilling {
            lists: HashMap::from([
                (SubscriptionStatus::Active, Some(vec!["MISSING", "S3"])),
                (SubscriptionStatus::PaymentPending, Some(vec!["S3"])),
            ]),
            docs: HashMap::from([(
                "S3",
                json!({
                    "subscription": "S3",
                    "status": 2,
                    "customer_email": "ana@example.com",
                    "recurrences": [
                        {"number_recurrence": 1, "payment_date": "2024-01-10", "products": [{"sku": "KIT01", "quantity": 1}]},
                        {"number_recurrence": 2, "products": [{"sku": "KIT01", "quantity": 2}, {"sku": "MUG", "quantity": 1}]}
                    ]
                }),
            )]),
            ..Default::default()
        };

        let sweep = sweep(store.clone(), billing);
        let report = completed(sweep.run_cycle().await);
        assert_eq!(report.fetch_failed, 1);
        assert_eq!(report.fetched, 1);
        // De-duplicated across statuses.
        assert_eq!(*sweep.billing.detail_calls.lock().unwrap(), vec!["MISSING", "S3"]);

        let sub = store
            .load_subscription(&SubscriptionId::parse("S3").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(sub.order(1).unwrap().stock_released);
        assert!(sub.order(2).unwrap().holds_reservation());
        assert_eq!(sub.order(2).unwrap().products.len(), 1);
        assert!(store.customer("ana@example.com").unwrap().is_some());

        let ops = store.operations().unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!((ops[0].kind, ops[0].quantity), (SyncOperationKind::Insert, 2));

        // Second pass against the same documents changes nothing.
        let again = completed(sweep.run_cycle().await);
        assert_eq!(again.operations, 0);
        assert_eq!(store.operations().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_gate_skips_the_cycle() {
        let store = store_with(vec![]).await;
        let gate = ApiGate::new();
        let sweep = ReconciliationSweep::new(
            store,
            FakeBilling::default(),
            gate.clone(),
            Duration::from_secs(1),
            BackoffPolicy::default(),
        );
        let _held = gate.acquire("webhook-jobs", Duration::from_secs(1)).await.unwrap();
        assert_eq!(sweep.run_cycle().await, CycleOutcome::Skipped);
    }
}
