//! Durable webhook job queue and its single polling worker.
//!
//! ## Components
//!
//! - `WebhookJob`: queued notification with the retry state machine
//! - `WebhookWorker`: drains ready jobs, dispatching by event type
//! - `SubscriptionUpdateHandler`: the `subscription_update` reconciliation path

mod handlers;
mod types;
mod worker;

pub use handlers::SubscriptionUpdateHandler;
pub use types::{JobStatus, RetryPolicy, TerminalJob, WebhookJob};
pub use worker::{DrainReport, JobError, JobHandler, UnknownEventPolicy, WebhookWorker, stuck_cutoff};

/// Event type of provider subscription status notifications.
pub const SUBSCRIPTION_UPDATE: &str = "subscription_update";
