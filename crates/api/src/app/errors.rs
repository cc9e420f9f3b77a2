use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use invsync_infra::StoreError;
use invsync_infra::storefront::StorefrontError;

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn store_error_to_response(err: StoreError) -> Response {
    match err {
        StoreError::NotFound(what) => json_error(StatusCode::NOT_FOUND, "not_found", format!("not found: {what}")),
        other => json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", other.to_string()),
    }
}

pub fn storefront_error_to_response(err: StorefrontError) -> Response {
    match err {
        StorefrontError::ItemNotFound(sku) => {
            json_error(StatusCode::NOT_FOUND, "item_not_found", format!("no storefront item for sku {sku}"))
        }
        other => json_error(StatusCode::BAD_GATEWAY, "storefront_error", other.to_string()),
    }
}
