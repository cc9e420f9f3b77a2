//! Operator corrections of the reserved bucket.
//!
//! These bypass the sync outbox and talk to the storefront directly, for
//! repairing drift the reconciliation cannot see.

use serde::Serialize;
use tracing::{info, instrument};

use invsync_core::InventoryItemId;

use super::{InventoryBucket, Storefront, StorefrontError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservedCorrection {
    /// Add to reserved only; available is left alone.
    Increase(i64),
    /// Take from reserved only; available is left alone.
    Decrease(i64),
    /// Move everything reserved back to available.
    Reset,
}

impl ReservedCorrection {
    pub fn as_str(self) -> &'static str {
        match self {
            ReservedCorrection::Increase(_) => "increase",
            ReservedCorrection::Decrease(_) => "decrease",
            ReservedCorrection::Reset => "reset",
        }
    }

    #[instrument(skip(self, storefront, item), fields(inventory_item = %item, action = self.as_str()), err)]
    pub async fn apply<S: Storefront + ?Sized>(
        self,
        storefront: &S,
        item: &InventoryItemId,
    ) -> Result<ReservedCorrected, StorefrontError> {
        let previous_reserved = storefront.quantities(item).await?.reserved;
        let (reserved_delta, available_delta) = match self {
            ReservedCorrection::Increase(amount) => (amount, 0),
            ReservedCorrection::Decrease(amount) => (-amount, 0),
            ReservedCorrection::Reset => (-previous_reserved, previous_reserved),
        };

        if reserved_delta != 0 {
            storefront.adjust(item, InventoryBucket::Reserved, reserved_delta).await?;
        }
        if available_delta != 0 {
            storefront.adjust(item, InventoryBucket::Available, available_delta).await?;
        }
        info!(previous_reserved, reserved_delta, available_delta, "reserved stock corrected");

        Ok(ReservedCorrected {
            inventory_item_id: item.clone(),
            action: self.as_str(),
            previous_reserved,
            reserved_delta,
            available_delta,
        })
    }
}

/// What a correction did to one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReservedCorrected {
    pub inventory_item_id: InventoryItemId,
    pub action: &'static str,
    /// Reserved quantity read before the correction.
    pub previous_reserved: i64,
    pub reserved_delta: i64,
    pub available_delta: i64,
}
