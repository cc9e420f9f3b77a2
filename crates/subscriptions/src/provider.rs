//! Documents returned by the billing provider.
//!
//! The provider is loose about JSON types (numbers often arrive as strings and
//! empty collections as `null`), so every field is read leniently and unknown
//! fields are ignored.

use chrono::NaiveDate;
use serde::Deserialize;

use invsync_core::{DomainError, DomainResult, Sku, SubscriptionId};

use crate::catalog::ControlledSkus;
use crate::lenient;
use crate::model::{Customer, LineItem};
use crate::status::SubscriptionStatus;

/// One page of a list-by-status call.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionPage {
    #[serde(default, deserialize_with = "lenient::null_as_empty")]
    pub subscriptions: Vec<SubscriptionRef>,
}

/// A list entry: either a bare id or an object carrying `subscription`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionRef {
    Id(#[serde(deserialize_with = "lenient::string_or_number")] String),
    Entry {
        #[serde(deserialize_with = "lenient::string_or_number")]
        subscription: String,
    },
}

impl SubscriptionRef {
    pub fn id(&self) -> &str {
        match self {
            SubscriptionRef::Id(id) => id,
            SubscriptionRef::Entry { subscription } => subscription,
        }
    }
}

impl SubscriptionPage {
    /// Valid ids on this page, in provider order. Blank ids are dropped.
    pub fn ids(&self) -> Vec<SubscriptionId> {
        self.subscriptions
            .iter()
            .filter_map(|entry| SubscriptionId::parse(entry.id()).ok())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

/// Full subscription document from the detail call.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSubscription {
    #[serde(rename = "subscription", deserialize_with = "lenient::string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub status: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub number_recurrences: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub next_billing_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub cancellation_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub customer_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub customer_email: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub customer_phone: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_empty")]
    pub recurrences: Vec<ProviderRecurrence>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderRecurrence {
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub order: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub number_recurrence: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub payment_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::null_as_empty")]
    pub products: Vec<ProviderLineItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderLineItem {
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_int")]
    pub quantity: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub unit_price: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string_or_number")]
    pub amount_total: Option<String>,
}

impl ProviderSubscription {
    pub fn subscription_id(&self) -> DomainResult<SubscriptionId> {
        SubscriptionId::parse(self.id.as_str())
    }

    pub fn status(&self) -> DomainResult<SubscriptionStatus> {
        let code = self
            .status
            .ok_or_else(|| DomainError::validation("subscription document has no status"))?;
        let code = i32::try_from(code).map_err(|_| DomainError::unknown_code("subscription status", code))?;
        SubscriptionStatus::from_code(code)
    }

    pub fn recurrence_count(&self) -> Option<u32> {
        self.number_recurrences.and_then(|n| u32::try_from(n).ok())
    }

    pub fn customer(&self) -> Option<Customer> {
        let email = self.customer_email.clone()?;
        Some(Customer {
            email,
            name: self.customer_name.clone(),
            phone: self.customer_phone.clone(),
        })
    }

    pub fn next_billing_date(&self) -> Option<NaiveDate> {
        self.next_billing_date.as_deref().and_then(parse_date)
    }

    pub fn cancellation_date(&self) -> Option<NaiveDate> {
        self.cancellation_date.as_deref().and_then(parse_date)
    }
}

impl ProviderRecurrence {
    /// Recurrence number, if it is a valid non-negative integer.
    pub fn number(&self) -> Option<u32> {
        self.number_recurrence.and_then(|n| u32::try_from(n).ok())
    }

    pub fn is_paid(&self) -> bool {
        self.payment_date.is_some()
    }

    /// Line items with usable SKUs, same-SKU entries summed, provider order kept.
    pub fn line_items(&self) -> Vec<LineItem> {
        let mut items: Vec<LineItem> = Vec::new();
        for raw in &self.products {
            let Some(sku) = raw.sku.as_deref().and_then(|s| Sku::parse(s).ok()) else {
                continue;
            };
            let quantity = raw.quantity.unwrap_or(0);
            match items.iter_mut().find(|item| item.sku == sku) {
                Some(existing) => existing.quantity += quantity,
                None => items.push(LineItem {
                    sku,
                    quantity,
                    unit_price: raw.unit_price.clone(),
                    total_price: raw.amount_total.clone(),
                }),
            }
        }
        items
    }

    pub fn controlled_line_items(&self, catalog: &ControlledSkus) -> Vec<LineItem> {
        self.line_items()
            .into_iter()
            .filter(|item| catalog.contains(&item.sku))
            .collect()
    }

    pub fn has_controlled_sku(&self, catalog: &ControlledSkus) -> bool {
        self.products
            .iter()
            .filter_map(|raw| raw.sku.as_deref().and_then(|s| Sku::parse(s).ok()))
            .any(|sku| catalog.contains(&sku))
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time component.
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detail_json() -> serde_json::Value {
        serde_json::json!({
            "subscription": 98765,
            "status": "2",
            "number_recurrences": 5,
            "next_billing_date": "2026-11-05",
            "cancellation_date": null,
            "customer_email": "ana@example.com",
            "customer_name": "Ana",
            "amount_brl": "199.90",
            "recurrences": [
                {
                    "order": "PB-5",
                    "number_recurrence": "5",
                    "payment_date": "",
                    "products": [
                        {"sku": "KIT01_BLUE", "quantity": "2", "unit_price": "49.90", "amount_total": "99.80"},
                        {"sku": "KIT01_BLUE", "quantity": 1},
                        {"sku": "MUG", "quantity": 1}
                    ]
                },
                {"order": "PB-4", "number_recurrence": 4, "payment_date": "2026-10-05 10:00:00", "products": null}
            ]
        })
    }

    #[test]
    fn detail_document_is_read_leniently() {
        let doc: ProviderSubscription = serde_json::from_value(detail_json()).unwrap();
        assert_eq!(doc.subscription_id().unwrap().as_str(), "98765");
        assert_eq!(doc.status().unwrap(), SubscriptionStatus::PaymentPending);
        assert_eq!(doc.recurrence_count(), Some(5));
        assert_eq!(doc.next_billing_date(), NaiveDate::from_ymd_opt(2026, 11, 5));
        assert_eq!(doc.cancellation_date(), None);
        assert_eq!(doc.customer().unwrap().email, "ana@example.com");

        let fifth = &doc.recurrences[0];
        assert_eq!(fifth.number(), Some(5));
        assert!(!fifth.is_paid(), "empty payment date means unpaid");
        assert!(doc.recurrences[1].is_paid());
        assert!(doc.recurrences[1].products.is_empty());
    }

    #[test]
    fn duplicate_skus_are_summed() {
        let doc: ProviderSubscription = serde_json::from_value(detail_json()).unwrap();
        let items = doc.recurrences[0].line_items();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].sku.as_str(), "KIT01_BLUE");
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[0].unit_price.as_deref(), Some("49.90"));
    }

    #[test]
    fn controlled_filter_uses_full_sku() {
        let doc: ProviderSubscription = serde_json::from_value(detail_json()).unwrap();
        let catalog = ControlledSkus::new([Sku::parse("KIT01_BLUE").unwrap()]);
        let controlled = doc.recurrences[0].controlled_line_items(&catalog);
        assert_eq!(controlled.len(), 1);
        assert!(doc.recurrences[0].has_controlled_sku(&catalog));

        let base_only = ControlledSkus::new([Sku::parse("KIT01").unwrap()]);
        assert!(!doc.recurrences[0].has_controlled_sku(&base_only));
    }

    #[test]
    fn list_page_accepts_objects_and_bare_ids() {
        let page: SubscriptionPage = serde_json::from_value(serde_json::json!({
            "subscriptions": [{"subscription": "A1", "status": 1}, "B2", 303, {"subscription": " "}]
        }))
        .unwrap();
        let ids: Vec<String> = page.ids().into_iter().map(|id| id.to_string()).collect();
        assert_eq!(ids, vec!["A1", "B2", "303"]);
    }

    #[test]
    fn null_list_is_empty_page() {
        let page: SubscriptionPage =
            serde_json::from_value(serde_json::json!({"subscriptions": null})).unwrap();
        assert!(page.is_empty());
        let page: SubscriptionPage = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(page.is_empty());
    }
}
