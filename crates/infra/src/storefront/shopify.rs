//! Shopify Admin GraphQL implementation of [`Storefront`].

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use invsync_core::InventoryItemId;

use super::{BucketQuantities, InventoryBucket, Storefront, StorefrontError};
use crate::config::StorefrontConfig;

/// Extra attempts after a transport failure.
const TRANSPORT_RETRIES: u32 = 2;
const RETRY_PAUSE: Duration = Duration::from_millis(500);

const FIND_ITEM_QUERY: &str = r#"
query FindInventoryItem($query: String!) {
  products(first: 1, query: $query) {
    edges { node { variants(first: 100) { edges { node { sku inventoryItem { id } } } } } }
  }
}"#;

const ADJUST_MUTATION: &str = r#"
mutation AdjustInventory($input: InventoryAdjustQuantitiesInput!) {
  inventoryAdjustQuantities(input: $input) {
    userErrors { field message }
  }
}"#;

const QUANTITIES_QUERY: &str = r#"
query InventoryQuantities($id: ID!, $locationId: ID!) {
  inventoryItem(id: $id) {
    inventoryLevel(locationId: $locationId) {
      quantities(names: ["available", "committed", "on_hand", "reserved"]) { name quantity }
    }
  }
}"#;

pub struct ShopifyStorefront {
    client: reqwest::Client,
    endpoint: String,
    access_token: String,
    location_gid: String,
}

impl ShopifyStorefront {
    pub fn new(config: &StorefrontConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.graphql_endpoint(),
            access_token: config.access_token.clone(),
            location_gid: config.location_gid(),
        })
    }

    async fn post_once(&self, body: &Value) -> Result<Value, StorefrontError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| StorefrontError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorefrontError::Status(status.as_u16()));
        }
        let doc: Value = response
            .json()
            .await
            .map_err(|e| StorefrontError::Decode(e.to_string()))?;
        check_graphql_errors(&doc)?;
        Ok(doc)
    }

    async fn post(&self, query: &str, variables: Value) -> Result<Value, StorefrontError> {
        let body = json!({ "query": query, "variables": variables });
        let mut attempt = 0;
        loop {
            match self.post_once(&body).await {
                Err(StorefrontError::Transport(err)) if attempt < TRANSPORT_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %err, "storefront transport error, retrying");
                    tokio::time::sleep(RETRY_PAUSE).await;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl Storefront for ShopifyStorefront {
    #[instrument(skip(self), err)]
    async fn find_inventory_item(&self, sku: &str) -> Result<InventoryItemId, StorefrontError> {
        let doc = self
            .post(FIND_ITEM_QUERY, json!({ "query": format!("sku:{sku}") }))
            .await?;
        let item = parse_inventory_item(&doc, sku)?;
        debug!(inventory_item = %item, "storefront item resolved");
        Ok(item)
    }

    #[instrument(skip(self), fields(inventory_item = %item), err)]
    async fn adjust(&self, item: &InventoryItemId, bucket: InventoryBucket, delta: i64) -> Result<(), StorefrontError> {
        let input = adjustment_input(item, bucket, delta, &self.location_gid, Uuid::now_v7());
        let doc = self.post(ADJUST_MUTATION, json!({ "input": input })).await?;
        parse_adjustment(&doc)
    }

    #[instrument(skip(self), fields(inventory_item = %item), err)]
    async fn quantities(&self, item: &InventoryItemId) -> Result<BucketQuantities, StorefrontError> {
        let doc = self
            .post(
                QUANTITIES_QUERY,
                json!({ "id": item.as_str(), "locationId": self.location_gid }),
            )
            .await?;
        parse_quantities(&doc)
    }
}

fn check_graphql_errors(doc: &Value) -> Result<(), StorefrontError> {
    match doc.get("errors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(StorefrontError::GraphQl(join_messages(errors))),
        _ => Ok(()),
    }
}

fn join_messages(errors: &[Value]) -> String {
    errors
        .iter()
        .map(|e| e.get("message").and_then(Value::as_str).unwrap_or("unknown error"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn edges(value: Option<&Value>) -> impl Iterator<Item = &Value> {
    value
        .and_then(|v| v.get("edges"))
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|edge| edge.get("node"))
}

/// First variant whose SKU matches exactly.
pub(crate) fn parse_inventory_item(doc: &Value, sku: &str) -> Result<InventoryItemId, StorefrontError> {
    let products = doc.pointer("/data/products");
    edges(products)
        .flat_map(|product| edges(product.get("variants")))
        .find(|variant| variant.get("sku").and_then(Value::as_str) == Some(sku))
        .and_then(|variant| variant.pointer("/inventoryItem/id"))
        .and_then(Value::as_str)
        .and_then(|id| InventoryItemId::parse(id).ok())
        .ok_or_else(|| StorefrontError::ItemNotFound(sku.to_string()))
}

pub(crate) fn adjustment_input(
    item: &InventoryItemId,
    bucket: InventoryBucket,
    delta: i64,
    location_gid: &str,
    reference: Uuid,
) -> Value {
    let mut change = json!({
        "delta": delta,
        "inventoryItemId": item.as_str(),
        "locationId": location_gid,
    });
    let mut input = json!({
        "name": bucket.as_str(),
        "reason": "correction",
    });
    // Non-available buckets require a ledger document on each change.
    if bucket != InventoryBucket::Available {
        let uri = format!("gid://inventory-sync-app/{}-adjustment/{reference}", bucket.as_str());
        change["ledgerDocumentUri"] = json!(uri);
        input["referenceDocumentUri"] = json!(uri);
    }
    input["changes"] = json!([change]);
    input
}

pub(crate) fn parse_adjustment(doc: &Value) -> Result<(), StorefrontError> {
    let payload = doc
        .pointer("/data/inventoryAdjustQuantities")
        .ok_or_else(|| StorefrontError::Decode("missing inventoryAdjustQuantities".into()))?;
    match payload.get("userErrors").and_then(Value::as_array) {
        Some(errors) if !errors.is_empty() => Err(StorefrontError::UserErrors(join_messages(errors))),
        _ => Ok(()),
    }
}

pub(crate) fn parse_quantities(doc: &Value) -> Result<BucketQuantities, StorefrontError> {
    let entries = doc
        .pointer("/data/inventoryItem/inventoryLevel/quantities")
        .and_then(Value::as_array)
        .ok_or_else(|| StorefrontError::Decode("no inventory level at location".into()))?;

    let mut quantities = BucketQuantities::default();
    for entry in entries {
        let amount = entry.get("quantity").and_then(Value::as_i64).unwrap_or(0);
        match entry.get("name").and_then(Value::as_str) {
            Some("available") => quantities.available = amount,
            Some("committed") => quantities.committed = amount,
            Some("on_hand") => quantities.on_hand = amount,
            Some("reserved") => quantities.reserved = amount,
            _ => {}
        }
    }
    Ok(quantities)
}
