use chrono::{DateTime, Utc};
use serde::Serialize;

use invsync_core::{InventoryItemId, JobId};
use invsync_infra::WebhookJob;
use invsync_infra::storefront::{BucketQuantities, ReservedCorrected};

#[derive(Debug, Serialize)]
pub struct WebhookReceived {
    pub status: &'static str,
    pub job_id: JobId,
    pub duplicate: bool,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct JobList {
    pub count: usize,
    pub jobs: Vec<WebhookJob>,
}

impl From<Vec<WebhookJob>> for JobList {
    fn from(jobs: Vec<WebhookJob>) -> Self {
        Self { count: jobs.len(), jobs }
    }
}

#[derive(Debug, Serialize)]
pub struct InventoryLevels {
    pub sku: String,
    pub inventory_item_id: InventoryItemId,
    pub quantities: BucketQuantities,
}

#[derive(Debug, Serialize)]
pub struct ReservedLevel {
    pub sku: String,
    pub inventory_item_id: InventoryItemId,
    pub reserved: i64,
}

#[derive(Debug, Serialize)]
pub struct ReservedCorrectionApplied {
    pub sku: String,
    #[serde(flatten)]
    pub outcome: ReservedCorrected,
}
