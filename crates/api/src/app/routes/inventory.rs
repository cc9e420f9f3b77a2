use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use invsync_core::{InventoryItemId, Sku};
use invsync_infra::storefront::ReservedCorrection;

use crate::app::{ApiStore, AppServices, dto, errors};

#[derive(Debug, Deserialize)]
pub struct AmountQuery {
    pub amount: Option<i64>,
}

/// Parse the path SKU and resolve its storefront item, or the error response.
async fn resolve<S: ApiStore>(services: &AppServices<S>, raw: String) -> Result<(Sku, InventoryItemId), Response> {
    let sku = Sku::parse(raw)
        .map_err(|err| errors::json_error(StatusCode::BAD_REQUEST, "invalid_sku", err.to_string()))?;
    let item = services
        .storefront
        .find_inventory_item(sku.storefront_sku())
        .await
        .map_err(errors::storefront_error_to_response)?;
    Ok((sku, item))
}

/// Live storefront quantities for one SKU at the configured location.
pub async fn levels<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
) -> Response {
    let (sku, item) = match resolve(&services, sku).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    match services.storefront.quantities(&item).await {
        Ok(quantities) => Json(dto::InventoryLevels {
            sku: sku.storefront_sku().to_string(),
            inventory_item_id: item,
            quantities,
        })
        .into_response(),
        Err(err) => errors::storefront_error_to_response(err),
    }
}

pub async fn reserved<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
) -> Response {
    let (sku, item) = match resolve(&services, sku).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    match services.storefront.quantities(&item).await {
        Ok(quantities) => Json(dto::ReservedLevel {
            sku: sku.storefront_sku().to_string(),
            inventory_item_id: item,
            reserved: quantities.reserved,
        })
        .into_response(),
        Err(err) => errors::storefront_error_to_response(err),
    }
}

pub async fn increase_reserved<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
    Query(query): Query<AmountQuery>,
) -> Response {
    match positive_amount(&query) {
        Ok(amount) => correct(&services, sku, ReservedCorrection::Increase(amount)).await,
        Err(response) => response,
    }
}

pub async fn decrease_reserved<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
    Query(query): Query<AmountQuery>,
) -> Response {
    match positive_amount(&query) {
        Ok(amount) => correct(&services, sku, ReservedCorrection::Decrease(amount)).await,
        Err(response) => response,
    }
}

/// Move the item's whole reserved quantity back to available.
pub async fn reset_reserved<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(sku): Path<String>,
) -> Response {
    correct(&services, sku, ReservedCorrection::Reset).await
}

fn positive_amount(query: &AmountQuery) -> Result<i64, Response> {
    match query.amount {
        Some(amount) if amount > 0 => Ok(amount),
        _ => Err(errors::json_error(
            StatusCode::BAD_REQUEST,
            "invalid_amount",
            "amount must be a positive integer",
        )),
    }
}

async fn correct<S: ApiStore>(services: &AppServices<S>, sku: String, correction: ReservedCorrection) -> Response {
    let (sku, item) = match resolve(services, sku).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };
    match correction.apply(services.storefront.as_ref(), &item).await {
        Ok(outcome) => Json(dto::ReservedCorrectionApplied {
            sku: sku.storefront_sku().to_string(),
            outcome,
        })
        .into_response(),
        Err(err) => errors::storefront_error_to_response(err),
    }
}
