use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde_json::Value;
use tracing::{error, info, warn};

use invsync_core::SubscriptionId;
use invsync_infra::IncomingWebhook;
use invsync_infra::jobs::SUBSCRIPTION_UPDATE;

use crate::app::{ApiStore, AppServices, dto, errors};
use crate::signature;

pub const SOURCE: &str = "pagstream";

/// Verify, de-duplicate and queue a subscription-update notification. The
/// reconciliation itself happens later in the job worker.
pub async fn subscription_update<S: ApiStore>(
    Extension(services): Extension<Arc<AppServices<S>>>,
    body: String,
) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "webhook body is not JSON");
            return unauthorized("unparsable webhook body");
        }
    };

    let Some(signature) = payload.get("signature").and_then(Value::as_str) else {
        warn!("webhook without signature");
        return unauthorized("missing signature");
    };
    if !signature::verify(&payload, signature, services.hmac_key.as_bytes()) {
        warn!("webhook signature mismatch");
        return unauthorized("invalid signature");
    }

    let subscription_id = payload.get("subscription").and_then(subscription_ref);
    let webhook = IncomingWebhook {
        signature: signature.to_string(),
        source: SOURCE.to_string(),
        event_type: SUBSCRIPTION_UPDATE.to_string(),
        subscription_id: subscription_id.clone(),
        payload: body,
    };

    let received_at = Utc::now();
    match services.guard.register(webhook, received_at).await {
        Ok(registration) => {
            info!(
                subscription_id = ?subscription_id.as_ref().map(SubscriptionId::as_str),
                job_id = %registration.job_id(),
                duplicate = registration.is_duplicate(),
                "webhook received"
            );
            (
                StatusCode::OK,
                Json(dto::WebhookReceived {
                    status: "received",
                    job_id: registration.job_id(),
                    duplicate: registration.is_duplicate(),
                    received_at,
                }),
            )
                .into_response()
        }
        Err(err) => {
            error!(error = %err, "webhook registration failed");
            errors::json_error(StatusCode::SERVICE_UNAVAILABLE, "store_unavailable", err.to_string())
        }
    }
}

fn unauthorized(message: &'static str) -> Response {
    errors::json_error(StatusCode::UNAUTHORIZED, "invalid_signature", message)
}

/// The provider sends the id either as a string or as a bare number.
fn subscription_ref(value: &Value) -> Option<SubscriptionId> {
    let raw = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    SubscriptionId::parse(raw).ok()
}
