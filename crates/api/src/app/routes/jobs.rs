use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;

use invsync_core::JobId;
use invsync_infra::StoreError;
use invsync_infra::jobs::stuck_cutoff;

use crate::app::{ApiStore, AppServices, dto, errors};

const DEFAULT_DEAD_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct DeadQuery {
    pub limit: Option<usize>,
}

pub async fn stats<S: ApiStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    match services.store.job_stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

pub async fn stuck<S: ApiStore>(Extension(services): Extension<Arc<AppServices<S>>>) -> Response {
    let started_before = stuck_cutoff(Utc::now(), services.stuck_threshold);
    match services.store.stuck_jobs(started_before).await {
        Ok(jobs) => Json(dto::JobList::from(jobs)).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

pub async fn dead<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Query(query): Query<DeadQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(DEFAULT_DEAD_LIMIT);
    match services.store.dead_jobs(limit).await {
        Ok(jobs) => Json(dto::JobList::from(jobs)).into_response(),
        Err(err) => errors::store_error_to_response(err),
    }
}

pub async fn show<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    Path(id): Path<String>,
) -> Response {
    let id: JobId = match id.parse() {
        Ok(id) => id,
        Err(err) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid_job_id", err.to_string()),
    };
    match services.store.job(id).await {
        Ok(Some(job)) => Json(job).into_response(),
        Ok(None) => errors::store_error_to_response(StoreError::NotFound(format!("job {id}"))),
        Err(err) => errors::store_error_to_response(err),
    }
}
