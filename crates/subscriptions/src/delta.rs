//! Per-order line-item delta.
//!
//! Compares the line items held for an order with the freshly fetched ones
//! and emits only the change, so unchanged quantities are never re-released.

use invsync_core::SubscriptionId;

use crate::catalog::ControlledSkus;
use crate::model::LineItem;
use crate::sync::{SyncIntent, SyncOperationKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemDiff {
    /// Operations to enqueue, in emission order.
    pub intents: Vec<SyncIntent>,
    /// The order's line items after the change.
    pub items: Vec<LineItem>,
}

/// Diff `old` against `new` for one reserved order.
///
/// SKUs in both: a `Delta` of `new − old` when non-zero, prices refreshed.
/// Only in old: `Delete` of the held quantity, line item dropped.
/// Only in new and controlled: `Insert`, line item added.
/// Only in new and uncontrolled: ignored.
pub fn diff_line_items(
    subscription_id: &SubscriptionId,
    old: &[LineItem],
    new: &[LineItem],
    catalog: &ControlledSkus,
) -> LineItemDiff {
    let mut intents = Vec::new();
    let mut items = Vec::with_capacity(new.len());

    for fresh in new {
        match old.iter().find(|held| held.sku == fresh.sku) {
            Some(held) => {
                let delta = fresh.quantity - held.quantity;
                if delta != 0 {
                    intents.push(SyncIntent::new(
                        subscription_id.clone(),
                        SyncOperationKind::Delta,
                        fresh.sku.clone(),
                        delta,
                    ));
                }
                items.push(fresh.clone());
            }
            None if catalog.contains(&fresh.sku) => {
                intents.push(SyncIntent::new(
                    subscription_id.clone(),
                    SyncOperationKind::Insert,
                    fresh.sku.clone(),
                    fresh.quantity,
                ));
                items.push(fresh.clone());
            }
            None => {}
        }
    }

    for held in old {
        if !new.iter().any(|fresh| fresh.sku == held.sku) {
            intents.push(SyncIntent::new(
                subscription_id.clone(),
                SyncOperationKind::Delete,
                held.sku.clone(),
                held.quantity,
            ));
        }
    }

    LineItemDiff { intents, items }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invsync_core::Sku;
    use proptest::prelude::*;

    fn sku(s: &str) -> Sku {
        Sku::parse(s).unwrap()
    }

    fn item(s: &str, quantity: i64) -> LineItem {
        LineItem {
            sku: sku(s),
            quantity,
            unit_price: None,
            total_price: None,
        }
    }

    fn sub() -> SubscriptionId {
        SubscriptionId::parse("S-1").unwrap()
    }

    #[test]
    fn quantity_increase_emits_single_delta() {
        let catalog = ControlledSkus::new([sku("A"), sku("B")]);
        let old = vec![item("A", 2), item("B", 1)];
        let new = vec![item("A", 3), item("B", 1)];

        let diff = diff_line_items(&sub(), &old, &new, &catalog);
        assert_eq!(diff.intents.len(), 1);
        assert_eq!(diff.intents[0].kind, SyncOperationKind::Delta);
        assert_eq!(diff.intents[0].quantity, 1);
        assert_eq!(diff.items, new);
    }

    #[test]
    fn removed_sku_is_deleted_and_added_sku_inserted() {
        let catalog = ControlledSkus::new([sku("A"), sku("C")]);
        let old = vec![item("A", 2)];
        let new = vec![item("C", 4), item("MUG", 1)];

        let diff = diff_line_items(&sub(), &old, &new, &catalog);
        let kinds: Vec<_> = diff.intents.iter().map(|i| (i.kind, i.sku.as_str(), i.quantity)).collect();
        assert_eq!(
            kinds,
            vec![(SyncOperationKind::Insert, "C", 4), (SyncOperationKind::Delete, "A", 2)]
        );
        assert_eq!(diff.items, vec![item("C", 4)]);
    }

    #[test]
    fn price_changes_update_items_without_operations() {
        let catalog = ControlledSkus::new([sku("A")]);
        let old = vec![item("A", 2)];
        let mut repriced = item("A", 2);
        repriced.unit_price = Some("10.00".into());

        let diff = diff_line_items(&sub(), &old, &[repriced.clone()], &catalog);
        assert!(diff.intents.is_empty());
        assert_eq!(diff.items, vec![repriced]);
    }

    fn items_strategy() -> impl Strategy<Value = Vec<LineItem>> {
        proptest::collection::btree_map("[A-E]", 1i64..20, 0..5).prop_map(|m| {
            m.into_iter().map(|(s, q)| item(&s, q)).collect()
        })
    }

    proptest! {
        #[test]
        fn identical_sets_yield_no_operations(items in items_strategy()) {
            let catalog: ControlledSkus = items.iter().map(|i| i.sku.clone()).collect();
            let diff = diff_line_items(&sub(), &items, &items, &catalog);
            prop_assert!(diff.intents.is_empty());
            prop_assert_eq!(diff.items, items);
        }

        #[test]
        fn reserved_change_equals_controlled_quantity_change(
            old in items_strategy(),
            new in items_strategy(),
        ) {
            let catalog = ControlledSkus::new(["A", "B", "C"].map(sku));
            let diff = diff_line_items(&sub(), &old, &new, &catalog);

            let reserved: i64 = diff.intents.iter().map(|i| i.inventory_delta().reserved).sum();
            let before: i64 = old.iter().map(|i| i.quantity).sum();
            let after: i64 = diff.items.iter().map(|i| i.quantity).sum();
            prop_assert_eq!(reserved, after - before);
        }
    }
}
