//! Storefront inventory API: SKU lookup, bucket adjustment, quantity query,
//! and operator corrections of the reserved bucket.
//!
//! Not behind the billing-provider gate; the storefront has its own limits.

mod reserved;
mod shopify;

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use invsync_core::InventoryItemId;

pub use reserved::{ReservedCorrected, ReservedCorrection};
pub use shopify::ShopifyStorefront;

/// Named inventory bucket at the configured location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryBucket {
    Reserved,
    Available,
}

impl InventoryBucket {
    pub fn as_str(self) -> &'static str {
        match self {
            InventoryBucket::Reserved => "reserved",
            InventoryBucket::Available => "available",
        }
    }
}

impl core::fmt::Display for InventoryBucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current bucket quantities for one item at the configured location.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BucketQuantities {
    pub available: i64,
    pub committed: i64,
    pub on_hand: i64,
    pub reserved: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StorefrontError {
    #[error("storefront transport error: {0}")]
    Transport(String),
    #[error("storefront returned HTTP {0}")]
    Status(u16),
    #[error("storefront GraphQL errors: {0}")]
    GraphQl(String),
    #[error("storefront rejected adjustment: {0}")]
    UserErrors(String),
    #[error("no storefront inventory item for sku {0}")]
    ItemNotFound(String),
    #[error("unreadable storefront response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait Storefront: Send + Sync {
    /// Resolve a storefront SKU (already suffix-stripped) to its inventory item.
    async fn find_inventory_item(&self, sku: &str) -> Result<InventoryItemId, StorefrontError>;

    /// Apply a signed delta to one bucket at the configured location.
    async fn adjust(&self, item: &InventoryItemId, bucket: InventoryBucket, delta: i64) -> Result<(), StorefrontError>;

    async fn quantities(&self, item: &InventoryItemId) -> Result<BucketQuantities, StorefrontError>;
}

#[async_trait]
impl<S: Storefront + ?Sized> Storefront for Arc<S> {
    async fn find_inventory_item(&self, sku: &str) -> Result<InventoryItemId, StorefrontError> {
        (**self).find_inventory_item(sku).await
    }

    async fn adjust(&self, item: &InventoryItemId, bucket: InventoryBucket, delta: i64) -> Result<(), StorefrontError> {
        (**self).adjust(item, bucket, delta).await
    }

    async fn quantities(&self, item: &InventoryItemId) -> Result<BucketQuantities, StorefrontError> {
        (**self).quantities(item).await
    }
}
