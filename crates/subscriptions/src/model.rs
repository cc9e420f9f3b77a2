//! Local mirror of billing-provider subscription state.
//!
//! Only subscriptions that carry (or carried) a controlled SKU are mirrored.
//! The tree is Subscription → Order (one per recurrence) → LineItem.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use invsync_core::{Sku, SubscriptionId};

use crate::status::SubscriptionStatus;

/// Owning customer, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
}

/// A persisted line item. Only controlled SKUs are ever stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub sku: Sku,
    pub quantity: i64,
    /// Decimal text as sent by the provider.
    pub unit_price: Option<String>,
    pub total_price: Option<String>,
}

/// One recurrence (billing cycle) of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub recurrence: u32,
    /// Provider order reference, when present.
    pub order_ref: Option<String>,
    /// `None` while unpaid.
    pub payment_date: Option<String>,
    pub stock_released: bool,
    pub products: Vec<LineItem>,
}

impl Order {
    /// A new order holds no reservation until inserts are emitted for it.
    pub fn new(recurrence: u32) -> Self {
        Self {
            recurrence,
            order_ref: None,
            payment_date: None,
            stock_released: true,
            products: Vec::new(),
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }

    /// Whether storefront stock is currently reserved for this order.
    pub fn holds_reservation(&self) -> bool {
        !self.stock_released && !self.products.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub status: SubscriptionStatus,
    pub recurrence_count: Option<u32>,
    pub next_billing_date: Option<NaiveDate>,
    pub cancellation_date: Option<NaiveDate>,
    pub customer: Option<Customer>,
    /// Orders keyed by recurrence number (unique per subscription).
    pub orders: BTreeMap<u32, Order>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    pub fn new(id: SubscriptionId, status: SubscriptionStatus, now: DateTime<Utc>) -> Self {
        Self {
            id,
            status,
            recurrence_count: None,
            next_billing_date: None,
            cancellation_date: None,
            customer: None,
            orders: BTreeMap::new(),
            updated_at: now,
        }
    }

    pub fn highest_recurrence(&self) -> Option<u32> {
        self.orders.keys().next_back().copied()
    }

    pub fn order(&self, recurrence: u32) -> Option<&Order> {
        self.orders.get(&recurrence)
    }

    pub fn insert_order(&mut self, order: Order) {
        self.orders.insert(order.recurrence, order);
    }

    /// Orders currently holding storefront stock.
    pub fn reserved_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.holds_reservation())
    }
}
