//! Narrow reconciliation driven by a `subscription_update` notification.
//!
//! Unlike the periodic sweep this never contacts the provider: it acts on the
//! status and recurrence count carried by the notification alone.

use serde_json::Value;

use invsync_core::{DomainError, DomainResult, SubscriptionId};

use crate::lenient::parse_int;
use crate::model::Subscription;
use crate::reconcile::{ReconcilePlan, SubscriptionChange, plan_drop, release_order};
use crate::status::SubscriptionStatus;

/// Fields of a `subscription_update` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionUpdate {
    pub subscription_id: SubscriptionId,
    pub status_code: i64,
    pub recurrence: u32,
}

impl SubscriptionUpdate {
    pub fn from_payload(payload: &Value) -> DomainResult<Self> {
        let subscription_id = match payload.get("subscription") {
            Some(Value::String(s)) => SubscriptionId::parse(s.as_str())?,
            Some(Value::Number(n)) => SubscriptionId::parse(n.to_string())?,
            _ => return Err(DomainError::validation("payload missing `subscription`")),
        };
        let status_code = payload
            .get("status")
            .and_then(parse_int)
            .ok_or_else(|| DomainError::validation("payload missing numeric `status`"))?;
        let recurrence = payload
            .get("number_recurrences")
            .and_then(parse_int)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| DomainError::validation("payload missing numeric `number_recurrences`"))?;
        Ok(Self {
            subscription_id,
            status_code,
            recurrence,
        })
    }

    /// `None` for codes this service does not know.
    pub fn status(&self) -> Option<SubscriptionStatus> {
        i32::try_from(self.status_code)
            .ok()
            .and_then(|code| SubscriptionStatus::from_code(code).ok())
    }
}

/// Plan the local change for a notification. Untracked subscriptions are left alone.
pub fn plan_webhook_update(local: Option<&Subscription>, update: &SubscriptionUpdate) -> ReconcilePlan {
    let Some(sub) = local else {
        return ReconcilePlan::noop();
    };

    match update.status() {
        Some(SubscriptionStatus::Active) => plan_paid(sub, update.recurrence),
        Some(SubscriptionStatus::PaymentPending) => plan_pending(sub, update.recurrence),
        Some(status) if status.releases_everything() => plan_drop(sub),
        _ => ReconcilePlan::noop(),
    }
}

fn plan_paid(sub: &Subscription, recurrence: u32) -> ReconcilePlan {
    let Some(highest) = sub.highest_recurrence() else {
        return plan_drop(sub);
    };
    if recurrence >= highest {
        // The newest held recurrence (or a later one) was paid: nothing left to reserve.
        return plan_drop(sub);
    }

    let Some(order) = sub.order(recurrence) else {
        return ReconcilePlan::noop();
    };
    let intents = release_order(&sub.id, order);
    let change = if sub.orders.len() > 1 {
        SubscriptionChange::RemoveOrders {
            subscription_id: sub.id.clone(),
            recurrences: vec![recurrence],
        }
    } else {
        SubscriptionChange::Remove(sub.id.clone())
    };
    ReconcilePlan { change, intents }
}

fn plan_pending(sub: &Subscription, recurrence: u32) -> ReconcilePlan {
    let (expired, remaining): (Vec<_>, Vec<_>) = sub
        .orders
        .values()
        .partition(|order| order.recurrence < recurrence);

    let intents = expired
        .iter()
        .flat_map(|order| release_order(&sub.id, order))
        .collect();

    let change = if remaining.is_empty() {
        SubscriptionChange::Remove(sub.id.clone())
    } else if expired.is_empty() {
        SubscriptionChange::Unchanged
    } else {
        SubscriptionChange::RemoveOrders {
            subscription_id: sub.id.clone(),
            recurrences: expired.iter().map(|order| order.recurrence).collect(),
        }
    };
    ReconcilePlan { change, intents }
}
