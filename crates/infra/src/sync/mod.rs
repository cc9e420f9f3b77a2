//! Sync-operation outbox and the processor that drains it to the storefront.

mod processor;
mod types;

pub use processor::{ProcessReport, SyncOperationProcessor};
pub use types::{MAX_SYNC_RETRIES, SyncOperation, SyncOperationStatus};
