//! `invsync-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the SKU value object and the domain error model.

pub mod error;
pub mod id;
pub mod sku;

pub use error::{DomainError, DomainResult};
pub use id::{InventoryItemId, JobId, SubscriptionId, SyncOperationId};
pub use sku::Sku;
