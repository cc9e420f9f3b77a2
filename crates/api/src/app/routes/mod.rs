use axum::{
    Router,
    routing::{get, post},
};

use crate::app::ApiStore;

pub mod inventory;
pub mod jobs;
pub mod sync_operations;
pub mod system;
pub mod webhooks;

pub fn router<S: ApiStore>() -> Router {
    Router::new()
        .route("/webhooks/pagstream/subscription-update", post(webhooks::subscription_update::<S>))
        .route("/jobs/stats", get(jobs::stats::<S>))
        .route("/jobs/stuck", get(jobs::stuck::<S>))
        .route("/jobs/dead", get(jobs::dead::<S>))
        .route("/jobs/:id", get(jobs::show::<S>))
        .route("/sync-operations/stats", get(sync_operations::stats::<S>))
        .route("/inventory/:sku", get(inventory::levels::<S>))
        .route("/inventory/:sku/reserved", get(inventory::reserved::<S>))
        .route("/inventory/:sku/reserved/increase", post(inventory::increase_reserved::<S>))
        .route("/inventory/:sku/reserved/decrease", post(inventory::decrease_reserved::<S>))
        .route("/inventory/:sku/reserved/reset", post(inventory::reset_reserved::<S>))
}
