//! Subscription reservation domain.
//!
//! This crate contains the business rules that turn billing-provider
//! subscription state into storefront inventory intents, implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod catalog;
pub mod delta;
pub mod model;
pub mod provider;
pub mod reconcile;
pub mod status;
pub mod sync;
pub mod webhook;
pub mod window;

mod lenient;

pub use catalog::ControlledSkus;
pub use delta::{LineItemDiff, diff_line_items};
pub use model::{Customer, LineItem, Order, Subscription};
pub use provider::{ProviderLineItem, ProviderRecurrence, ProviderSubscription, SubscriptionPage};
pub use reconcile::{ReconcilePlan, SubscriptionChange, plan_drop, plan_reconciliation};
pub use status::SubscriptionStatus;
pub use sync::{AdjustmentFactors, InventoryDelta, SyncIntent, SyncOperationKind};
pub use webhook::{SubscriptionUpdate, plan_webhook_update};
pub use window::{RecurrenceWindow, recurrence_window};
