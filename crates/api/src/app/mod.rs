//! HTTP API application wiring (Axum router + shared services).
//!
//! - `services.rs`: the state every handler shares (store, guard, storefront)
//! - `routes/`: HTTP routes + handlers (one file per area)
//! - `dto.rs`: response bodies
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use axum::{Extension, Router, routing::get};
use tower::ServiceBuilder;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

pub use services::{ApiStore, AppServices};

/// Build the full HTTP router (public entrypoint used by `main.rs` and the
/// black-box tests).
pub fn build_app<S: ApiStore>(services: Arc<AppServices<S>>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .merge(routes::router::<S>())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
