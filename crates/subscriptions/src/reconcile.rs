//! Periodic reconciliation planning.
//!
//! Given the local mirror of one subscription and its freshly fetched provider
//! document, compute the entity change and the storefront intents that bring
//! local reservations in line with the provider. Applying the returned plan
//! and planning again against the same document yields an empty plan.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use invsync_core::{DomainResult, SubscriptionId};

use crate::catalog::ControlledSkus;
use crate::delta::diff_line_items;
use crate::model::{Order, Subscription};
use crate::provider::{ProviderRecurrence, ProviderSubscription};
use crate::sync::{SyncIntent, SyncOperationKind};
use crate::window::recurrence_window;

/// Mutation to apply to the local subscription tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionChange {
    Unchanged,
    /// Replace the stored tree (subscription, customer, orders, line items).
    Upsert(Subscription),
    /// Delete line items, then orders, then the subscription.
    Remove(SubscriptionId),
    /// Delete only the listed orders (and their line items).
    RemoveOrders {
        subscription_id: SubscriptionId,
        recurrences: Vec<u32>,
    },
}

/// Outcome of planning one reconciliation unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub change: SubscriptionChange,
    pub intents: Vec<SyncIntent>,
}

impl ReconcilePlan {
    pub fn noop() -> Self {
        Self {
            change: SubscriptionChange::Unchanged,
            intents: Vec::new(),
        }
    }

    pub fn is_noop(&self) -> bool {
        matches!(self.change, SubscriptionChange::Unchanged) && self.intents.is_empty()
    }
}

/// Release intents for an order, if it still holds a reservation.
///
/// Only held reservations are released. An order that was already released,
/// or never reserved anything, emits no intents, so stock given back once is
/// never given back again when the same order is dropped or paid later.
pub(crate) fn release_order(subscription_id: &SubscriptionId, order: &Order) -> Vec<SyncIntent> {
    if !order.holds_reservation() {
        return Vec::new();
    }
    order
        .products
        .iter()
        .filter(|item| item.quantity != 0)
        .map(|item| {
            SyncIntent::new(
                subscription_id.clone(),
                SyncOperationKind::Delete,
                item.sku.clone(),
                item.quantity,
            )
        })
        .collect()
}

fn reserve_order(subscription_id: &SubscriptionId, order: &Order) -> Vec<SyncIntent> {
    order
        .products
        .iter()
        .filter(|item| item.quantity != 0)
        .map(|item| {
            SyncIntent::new(
                subscription_id.clone(),
                SyncOperationKind::Insert,
                item.sku.clone(),
                item.quantity,
            )
        })
        .collect()
}

/// Release every held reservation and remove the subscription locally.
pub fn plan_drop(local: &Subscription) -> ReconcilePlan {
    let intents = local
        .reserved_orders()
        .flat_map(|order| release_order(&local.id, order))
        .collect();
    ReconcilePlan {
        change: SubscriptionChange::Remove(local.id.clone()),
        intents,
    }
}

/// Plan one subscription from its fetched document.
pub fn plan_reconciliation(
    local: Option<&Subscription>,
    fetched: &ProviderSubscription,
    catalog: &ControlledSkus,
    now: DateTime<Utc>,
) -> DomainResult<ReconcilePlan> {
    let id = fetched.subscription_id()?;
    let status = fetched.status()?;

    if status.releases_everything() {
        return Ok(local.map(plan_drop).unwrap_or_else(ReconcilePlan::noop));
    }

    let incoming: BTreeMap<u32, &ProviderRecurrence> = fetched
        .recurrences
        .iter()
        .filter_map(|rec| rec.number().map(|n| (n, rec)))
        .collect();
    let window = recurrence_window(incoming.keys().copied());

    let controlled_in_window = window
        .members()
        .filter_map(|n| incoming.get(&n))
        .any(|rec| rec.has_controlled_sku(catalog));
    if !controlled_in_window {
        return Ok(local.map(plan_drop).unwrap_or_else(ReconcilePlan::noop));
    }

    let mut sub = local
        .cloned()
        .unwrap_or_else(|| Subscription::new(id.clone(), status, now));
    sub.status = status;
    sub.recurrence_count = fetched.recurrence_count();
    sub.next_billing_date = fetched.next_billing_date();
    sub.cancellation_date = fetched.cancellation_date();
    if let Some(customer) = fetched.customer() {
        sub.customer = Some(customer);
    }

    for (&n, rec) in &incoming {
        if !sub.orders.contains_key(&n) && rec.has_controlled_sku(catalog) {
            let mut order = Order::new(n);
            order.products = rec.controlled_line_items(catalog);
            sub.insert_order(order);
        }
    }

    let mut intents = Vec::new();
    for order in sub.orders.values_mut() {
        let Some(rec) = incoming.get(&order.recurrence) else {
            // No longer reported: expired.
            intents.extend(release_order(&id, order));
            order.stock_released = true;
            continue;
        };

        order.order_ref = rec.order.clone().or(order.order_ref.take());
        order.payment_date = rec.payment_date.clone();

        let desired = window.contains(order.recurrence) && !rec.is_paid();
        let current = order.holds_reservation();
        match (desired, current) {
            (true, true) => {
                let diff = diff_line_items(&id, &order.products, &rec.line_items(), catalog);
                intents.extend(diff.intents);
                order.products = diff.items;
            }
            (true, false) => {
                order.products = rec.controlled_line_items(catalog);
                intents.extend(reserve_order(&id, order));
            }
            (false, true) => {
                intents.extend(release_order(&id, order));
            }
            (false, false) => {
                order.products = rec.controlled_line_items(catalog);
            }
        }
        // The flag records what the emitted intents left on the storefront.
        order.stock_released = !desired || order.products.is_empty();
    }

    let changed = local.map_or(true, |l| !same_tree(l, &sub));
    if changed {
        sub.updated_at = now;
    }
    let change = if changed {
        SubscriptionChange::Upsert(sub)
    } else {
        SubscriptionChange::Unchanged
    };
    Ok(ReconcilePlan { change, intents })
}

fn same_tree(a: &Subscription, b: &Subscription) -> bool {
    a.status == b.status
        && a.recurrence_count == b.recurrence_count
        && a.next_billing_date == b.next_billing_date
        && a.cancellation_date == b.cancellation_date
        && a.customer == b.customer
        && a.orders == b.orders
}
