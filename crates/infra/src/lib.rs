//! Infrastructure layer: configuration, external clients, persistence and the
//! background tasks that drive reconciliation.

pub mod billing;
pub mod config;
pub mod gate;
pub mod idempotency;
pub mod jobs;
pub mod reconciliation;
pub mod scheduler;
pub mod store;
pub mod storefront;
pub mod sync;

pub use billing::{BackoffPolicy, BillingClient, BillingCredentials, BillingProvider, ReqwestTransport};
pub use config::{AppConfig, ConfigError};
pub use gate::{ApiGate, ApiPermit, GateError};
pub use idempotency::{CleanupStrategy, IdempotencyCleanup, IdempotencyGuard, IncomingWebhook, Registration};
pub use jobs::{JobStatus, SubscriptionUpdateHandler, WebhookJob, WebhookWorker};
pub use reconciliation::{CycleOutcome, ReconciliationSweep, SweepReport};
pub use scheduler::{PeriodicTask, Scheduler, SchedulerHandle};
pub use store::{InMemoryStore, PgStore, StoreError};
pub use storefront::{ShopifyStorefront, Storefront};
pub use sync::{SyncOperation, SyncOperationProcessor, SyncOperationStatus};
