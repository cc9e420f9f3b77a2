use std::sync::Arc;
use std::time::Duration;

use invsync_infra::IdempotencyGuard;
use invsync_infra::store::{ControlledSkuCatalog, IdempotencyStore, JobStore, SubscriptionStore, SyncOperationStore};
use invsync_infra::storefront::Storefront;

/// Every persistence concern the HTTP surface and the background tasks need.
pub trait ApiStore:
    SubscriptionStore + ControlledSkuCatalog + JobStore + IdempotencyStore + SyncOperationStore + 'static
{
}

impl<T> ApiStore for T where
    T: SubscriptionStore + ControlledSkuCatalog + JobStore + IdempotencyStore + SyncOperationStore + 'static
{
}

pub struct AppServices<S> {
    pub store: Arc<S>,
    pub guard: IdempotencyGuard<S>,
    pub storefront: Arc<dyn Storefront>,
    pub hmac_key: String,
    /// RUNNING jobs older than this are reported as stuck.
    pub stuck_threshold: Duration,
}

impl<S: ApiStore> AppServices<S> {
    pub fn new(store: Arc<S>, storefront: Arc<dyn Storefront>, hmac_key: impl Into<String>, stuck_threshold: Duration) -> Self {
        Self {
            guard: IdempotencyGuard::new(store.clone()),
            store,
            storefront,
            hmac_key: hmac_key.into(),
            stuck_threshold,
        }
    }
}
