//! Storefront sync intents and the reserved/available adjustment table.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use invsync_core::{DomainError, Sku, SubscriptionId};

/// Kind of inventory change recorded in the sync-operation outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOperationKind {
    /// New reservation.
    Insert,
    /// Signed change to an existing reservation.
    Delta,
    /// Reservation released back to available stock.
    Delete,
    /// Reservation consumed without returning stock.
    HardDecrement,
}

/// Per-unit multipliers applied to an operation's quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdjustmentFactors {
    pub reserved: i64,
    pub available: i64,
}

const ADJUSTMENTS: [(SyncOperationKind, AdjustmentFactors); 4] = [
    (SyncOperationKind::Insert, AdjustmentFactors { reserved: 1, available: -1 }),
    (SyncOperationKind::Delta, AdjustmentFactors { reserved: 1, available: -1 }),
    (SyncOperationKind::Delete, AdjustmentFactors { reserved: -1, available: 1 }),
    (SyncOperationKind::HardDecrement, AdjustmentFactors { reserved: -1, available: 0 }),
];

/// Concrete bucket changes for one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    pub reserved: i64,
    pub available: i64,
}

impl SyncOperationKind {
    pub const ALL: [SyncOperationKind; 4] = [
        SyncOperationKind::Insert,
        SyncOperationKind::Delta,
        SyncOperationKind::Delete,
        SyncOperationKind::HardDecrement,
    ];

    pub fn factors(self) -> AdjustmentFactors {
        ADJUSTMENTS
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, factors)| *factors)
            .unwrap_or(AdjustmentFactors { reserved: 0, available: 0 })
    }

    pub fn inventory_delta(self, quantity: i64) -> InventoryDelta {
        let factors = self.factors();
        InventoryDelta {
            reserved: factors.reserved * quantity,
            available: factors.available * quantity,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperationKind::Insert => "insert",
            SyncOperationKind::Delta => "delta",
            SyncOperationKind::Delete => "delete",
            SyncOperationKind::HardDecrement => "hard_decrement",
        }
    }
}

impl core::fmt::Display for SyncOperationKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperationKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| DomainError::unknown_code("sync operation kind", s))
    }
}

/// An inventory change the reconciliation rules decided on, not yet persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIntent {
    pub subscription_id: SubscriptionId,
    pub kind: SyncOperationKind,
    pub sku: Sku,
    /// Signed for `Delta`, the held quantity otherwise.
    pub quantity: i64,
}

impl SyncIntent {
    pub fn new(subscription_id: SubscriptionId, kind: SyncOperationKind, sku: Sku, quantity: i64) -> Self {
        Self {
            subscription_id,
            kind,
            sku,
            quantity,
        }
    }

    pub fn inventory_delta(&self) -> InventoryDelta {
        self.kind.inventory_delta(self.quantity)
    }
}
