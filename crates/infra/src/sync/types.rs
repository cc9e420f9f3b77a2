//! Storefront sync-operation outbox row.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use invsync_core::{DomainError, Sku, SubscriptionId, SyncOperationId};
use invsync_subscriptions::{InventoryDelta, SyncIntent, SyncOperationKind};

/// Failed attempts after which an operation is parked as FAILED.
pub const MAX_SYNC_RETRIES: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncOperationStatus {
    Pending,
    Executed,
    Failed,
}

impl SyncOperationStatus {
    pub const ALL: [SyncOperationStatus; 3] = [
        SyncOperationStatus::Pending,
        SyncOperationStatus::Executed,
        SyncOperationStatus::Failed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SyncOperationStatus::Pending => "PENDING",
            SyncOperationStatus::Executed => "EXECUTED",
            SyncOperationStatus::Failed => "FAILED",
        }
    }
}

impl core::fmt::Display for SyncOperationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncOperationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::unknown_code("sync operation status", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: SyncOperationId,
    pub subscription_id: SubscriptionId,
    pub kind: SyncOperationKind,
    pub sku: Sku,
    pub quantity: i64,
    pub status: SyncOperationStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub executed_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    pub fn from_intent(intent: SyncIntent, now: DateTime<Utc>) -> Self {
        Self {
            id: SyncOperationId::new(),
            subscription_id: intent.subscription_id,
            kind: intent.kind,
            sku: intent.sku,
            quantity: intent.quantity,
            status: SyncOperationStatus::Pending,
            retry_count: 0,
            error_message: None,
            created_at: now,
            executed_at: None,
        }
    }

    pub fn inventory_delta(&self) -> InventoryDelta {
        self.kind.inventory_delta(self.quantity)
    }

    pub fn is_pending(&self) -> bool {
        self.status == SyncOperationStatus::Pending
    }

    pub fn mark_executed(&mut self, now: DateTime<Utc>) {
        self.status = SyncOperationStatus::Executed;
        self.error_message = None;
        self.executed_at = Some(now);
    }

    /// Stays PENDING for the next poll until the retry ceiling.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        if !self.is_pending() {
            return;
        }
        self.retry_count += 1;
        self.error_message = Some(error.into());
        if self.retry_count >= MAX_SYNC_RETRIES {
            self.status = SyncOperationStatus::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op() -> SyncOperation {
        SyncOperation::from_intent(
            SyncIntent::new(
                SubscriptionId::parse("S1").unwrap(),
                SyncOperationKind::Delete,
                Sku::parse("KIT01_A").unwrap(),
                4,
            ),
            Utc::now(),
        )
    }

    #[test]
    fn third_failure_parks_the_operation() {
        let mut op = op();
        op.record_failure("timeout");
        op.record_failure("timeout");
        assert_eq!(op.status, SyncOperationStatus::Pending);
        assert_eq!(op.retry_count, 2);

        op.record_failure("item not found");
        assert_eq!(op.status, SyncOperationStatus::Failed);
        assert_eq!(op.retry_count, 3);

        op.record_failure("again");
        assert_eq!(op.retry_count, 3);
        assert_eq!(op.error_message.as_deref(), Some("item not found"));
    }

    #[test]
    fn execution_clears_error() {
        let mut op = op();
        op.record_failure("timeout");
        let now = Utc::now();
        op.mark_executed(now);
        assert_eq!(op.status, SyncOperationStatus::Executed);
        assert_eq!(op.executed_at, Some(now));
        assert!(op.error_message.is_none());
    }

    #[test]
    fn delta_comes_from_the_kind_table() {
        let delta = op().inventory_delta();
        assert_eq!((delta.reserved, delta.available), (-4, 4));
    }
}
