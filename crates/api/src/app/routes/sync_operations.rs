use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    response::{IntoResponse, Response},
};

use crate::app::{ApiStore, AppServices, errors};

pub async fn stats<S: ApiStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    match services.store.operation_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}
