use axum::{Json, response::IntoResponse};
use chrono::Utc;

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "time": Utc::now(),
    }))
}
