//! Postgres-backed store.
//!
//! ## Error Mapping
//!
//! | SQLx error | Postgres code | StoreError |
//! |------------|---------------|------------|
//! | Database (unique violation) | `23505` | `AlreadyExists` |
//! | Database (other) | any | `Storage` |
//! | PoolClosed / Io / other | n/a | `Storage` |
//! | Column decode, unknown status/kind codes | n/a | `Serialization` |

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use invsync_core::{JobId, Sku, SubscriptionId, SyncOperationId};
use invsync_subscriptions::{
    ControlledSkus, Customer, LineItem, Order, Subscription, SubscriptionChange, SubscriptionStatus,
};

use super::{
    ControlledSkuCatalog, IdempotencyStore, JobStats, JobStore, StoreError, SubscriptionStore, SyncOperationStats,
    SyncOperationStore,
};
use crate::idempotency::{CleanupStrategy, WebhookIdempotency};
use crate::jobs::WebhookJob;
use crate::sync::SyncOperation;

const SCHEMA: &str = include_str!("../../migrations/0001_init.sql");

const JOB_COLUMNS: &str = "id, source, event_type, subscription_id, payload, status, attempts, \
                           next_run_at, last_error, created_at, updated_at";

const OPERATION_COLUMNS: &str = "id, subscription_id, kind, sku, quantity, status, retry_count, \
                                 error_message, created_at, executed_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema. Idempotent.
    #[instrument(skip(self), err)]
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("migrate", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'_, Postgres>, StoreError> {
        self.pool.begin().await.map_err(|e| map_sqlx_error("begin_transaction", e))
    }
}

#[async_trait]
impl SubscriptionStore for PgStore {
    #[instrument(skip(self), fields(subscription_id = %id), err)]
    async fn load_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT s.id, s.status, s.recurrence_count, s.next_billing_date, s.cancellation_date,
                   s.updated_at, c.email, c.name, c.phone
            FROM subscriptions s
            LEFT JOIN customers c ON c.email = s.customer_email
            WHERE s.id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_subscription", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let status: i16 = get(&row, "status")?;
        let status = SubscriptionStatus::from_code(i32::from(status))
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let customer = get::<Option<String>>(&row, "email")?.map(|email| -> Result<Customer, StoreError> {
            Ok(Customer {
                email,
                name: get(&row, "name")?,
                phone: get(&row, "phone")?,
            })
        });

        let mut subscription = Subscription {
            id: id.clone(),
            status,
            recurrence_count: get::<Option<i32>>(&row, "recurrence_count")?.map(to_u32),
            next_billing_date: get::<Option<NaiveDate>>(&row, "next_billing_date")?,
            cancellation_date: get::<Option<NaiveDate>>(&row, "cancellation_date")?,
            customer: customer.transpose()?,
            orders: BTreeMap::new(),
            updated_at: get(&row, "updated_at")?,
        };

        let order_rows = sqlx::query(
            "SELECT recurrence, order_ref, payment_date, stock_released FROM orders WHERE subscription_id = $1",
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_orders", e))?;

        for row in &order_rows {
            let recurrence = to_u32(get(row, "recurrence")?);
            subscription.insert_order(Order {
                recurrence,
                order_ref: get(row, "order_ref")?,
                payment_date: get(row, "payment_date")?,
                stock_released: get(row, "stock_released")?,
                products: Vec::new(),
            });
        }

        let product_rows = sqlx::query(
            r#"
            SELECT recurrence, sku, quantity, unit_price, total_price
            FROM products
            WHERE subscription_id = $1
            ORDER BY id
            "#,
        )
        .bind(id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_products", e))?;

        for row in &product_rows {
            let recurrence = to_u32(get(row, "recurrence")?);
            let sku: String = get(row, "sku")?;
            let item = LineItem {
                sku: Sku::parse(sku).map_err(|e| StoreError::Serialization(e.to_string()))?,
                quantity: get(row, "quantity")?,
                unit_price: get(row, "unit_price")?,
                total_price: get(row, "total_price")?,
            };
            if let Some(order) = subscription.orders.get_mut(&recurrence) {
                order.products.push(item);
            }
        }

        Ok(Some(subscription))
    }

    #[instrument(skip(self, change, operations), fields(operation_count = operations.len()), err)]
    async fn commit(&self, change: SubscriptionChange, operations: Vec<SyncOperation>) -> Result<(), StoreError> {
        let mut tx = self.begin().await?;

        match &change {
            SubscriptionChange::Unchanged => {}
            SubscriptionChange::Upsert(subscription) => upsert_tree(&mut tx, subscription).await?,
            SubscriptionChange::Remove(id) => {
                delete_children(&mut tx, id, None).await?;
                sqlx::query("DELETE FROM subscriptions WHERE id = $1")
                    .bind(id.as_str())
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| map_sqlx_error("delete_subscription", e))?;
            }
            SubscriptionChange::RemoveOrders {
                subscription_id,
                recurrences,
            } => {
                let recurrences: Vec<i32> = recurrences.iter().map(|r| to_i32(*r)).collect();
                delete_children(&mut tx, subscription_id, Some(&recurrences)).await?;
            }
        }

        for op in &operations {
            insert_operation(&mut tx, op).await?;
        }

        tx.commit().await.map_err(|e| map_sqlx_error("commit_transaction", e))?;
        Ok(())
    }
}

/// Replace the stored tree: upsert parents, then rewrite orders and products.
async fn upsert_tree(tx: &mut Transaction<'_, Postgres>, subscription: &Subscription) -> Result<(), StoreError> {
    if let Some(customer) = &subscription.customer {
        sqlx::query(
            r#"
            INSERT INTO customers (email, name, phone) VALUES ($1, $2, $3)
            ON CONFLICT (email) DO UPDATE SET name = EXCLUDED.name, phone = EXCLUDED.phone
            "#,
        )
        .bind(&customer.email)
        .bind(&customer.name)
        .bind(&customer.phone)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_customer", e))?;
    }

    sqlx::query(
        r#"
        INSERT INTO subscriptions
            (id, status, recurrence_count, next_billing_date, cancellation_date, customer_email, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (id) DO UPDATE SET
            status = EXCLUDED.status,
            recurrence_count = EXCLUDED.recurrence_count,
            next_billing_date = EXCLUDED.next_billing_date,
            cancellation_date = EXCLUDED.cancellation_date,
            customer_email = EXCLUDED.customer_email,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(subscription.id.as_str())
    .bind(subscription.status.code() as i16)
    .bind(subscription.recurrence_count.map(to_i32))
    .bind(subscription.next_billing_date)
    .bind(subscription.cancellation_date)
    .bind(subscription.customer.as_ref().map(|c| c.email.as_str()))
    .bind(subscription.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("upsert_subscription", e))?;

    delete_children(tx, &subscription.id, None).await?;

    for order in subscription.orders.values() {
        sqlx::query(
            r#"
            INSERT INTO orders (subscription_id, recurrence, order_ref, payment_date, stock_released)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(subscription.id.as_str())
        .bind(to_i32(order.recurrence))
        .bind(&order.order_ref)
        .bind(&order.payment_date)
        .bind(order.stock_released)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;

        for item in &order.products {
            sqlx::query(
                r#"
                INSERT INTO products (subscription_id, recurrence, sku, quantity, unit_price, total_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(subscription.id.as_str())
            .bind(to_i32(order.recurrence))
            .bind(item.sku.as_str())
            .bind(item.quantity)
            .bind(&item.unit_price)
            .bind(&item.total_price)
            .execute(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("insert_product", e))?;
        }
    }
    Ok(())
}

/// Products first, then orders. `None` means every order of the subscription.
async fn delete_children(
    tx: &mut Transaction<'_, Postgres>,
    subscription_id: &SubscriptionId,
    recurrences: Option<&[i32]>,
) -> Result<(), StoreError> {
    match recurrences {
        None => {
            sqlx::query("DELETE FROM products WHERE subscription_id = $1")
                .bind(subscription_id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_products", e))?;
            sqlx::query("DELETE FROM orders WHERE subscription_id = $1")
                .bind(subscription_id.as_str())
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_orders", e))?;
        }
        Some(recurrences) => {
            sqlx::query("DELETE FROM products WHERE subscription_id = $1 AND recurrence = ANY($2)")
                .bind(subscription_id.as_str())
                .bind(recurrences)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_products", e))?;
            sqlx::query("DELETE FROM orders WHERE subscription_id = $1 AND recurrence = ANY($2)")
                .bind(subscription_id.as_str())
                .bind(recurrences)
                .execute(&mut **tx)
                .await
                .map_err(|e| map_sqlx_error("delete_orders", e))?;
        }
    }
    Ok(())
}

async fn insert_operation(tx: &mut Transaction<'_, Postgres>, op: &SyncOperation) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO sync_operations
            (id, subscription_id, kind, sku, quantity, status, retry_count, error_message, created_at, executed_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(op.id.as_uuid())
    .bind(op.subscription_id.as_str())
    .bind(op.kind.as_str())
    .bind(op.sku.as_str())
    .bind(op.quantity)
    .bind(op.status.as_str())
    .bind(to_i32(op.retry_count))
    .bind(&op.error_message)
    .bind(op.created_at)
    .bind(op.executed_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("insert_sync_operation", e))?;
    Ok(())
}

#[async_trait]
impl ControlledSkuCatalog for PgStore {
    #[instrument(skip(self), err)]
    async fn controlled_skus(&self) -> Result<ControlledSkus, StoreError> {
        let rows = sqlx::query("SELECT sku FROM controlled_skus")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("controlled_skus", e))?;

        rows.iter()
            .map(|row| {
                let sku: String = get(row, "sku")?;
                Sku::parse(sku).map_err(|e| StoreError::Serialization(e.to_string()))
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for PgStore {
    #[instrument(skip(self, job), fields(job_id = %job.id), err)]
    async fn enqueue_job(&self, job: &WebhookJob) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_jobs
                (id, source, event_type, subscription_id, payload, status, attempts,
                 next_run_at, last_error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(&job.source)
        .bind(&job.event_type)
        .bind(job.subscription_id.as_ref().map(SubscriptionId::as_str))
        .bind(&job.payload)
        .bind(job.status.as_str())
        .bind(to_i32(job.attempts))
        .bind(job.next_run_at)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("enqueue_job", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %id), err)]
    async fn job(&self, id: JobId) -> Result<Option<WebhookJob>, StoreError> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM webhook_jobs WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, status = %job.status), err)]
    async fn update_job(&self, job: &WebhookJob) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE webhook_jobs
            SET status = $2, attempts = $3, next_run_at = $4, last_error = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.status.as_str())
        .bind(to_i32(job.attempts))
        .bind(job.next_run_at)
        .bind(&job.last_error)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job.id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn ready_jobs(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<WebhookJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM webhook_jobs \
             WHERE status = 'PENDING' AND next_run_at <= $1 \
             ORDER BY next_run_at ASC LIMIT $2"
        ))
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ready_jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn job_stats(&self) -> Result<JobStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM webhook_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("job_stats", e))?;

        let mut stats = JobStats::default();
        for row in &rows {
            let status: String = get(row, "status")?;
            let count: i64 = get(row, "count")?;
            stats.record(parse_code(&status)?, count.max(0) as u64);
        }
        Ok(stats)
    }

    #[instrument(skip(self), err)]
    async fn stuck_jobs(&self, started_before: DateTime<Utc>) -> Result<Vec<WebhookJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM webhook_jobs \
             WHERE status = 'RUNNING' AND updated_at < $1 ORDER BY updated_at ASC"
        ))
        .bind(started_before)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stuck_jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn dead_jobs(&self, limit: usize) -> Result<Vec<WebhookJob>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM webhook_jobs \
             WHERE status IN ('DEAD', 'FAILED') ORDER BY updated_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("dead_jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }
}

#[async_trait]
impl IdempotencyStore for PgStore {
    #[instrument(skip(self, signature), err)]
    async fn find_idempotency(&self, signature: &str) -> Result<Option<WebhookIdempotency>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT signature, source, event_type, subscription_id, job_id, created_at, last_processed_at
            FROM webhook_idempotency
            WHERE signature = $1
            "#,
        )
        .bind(signature)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("find_idempotency", e))?;

        row.map(|row| {
            Ok(WebhookIdempotency {
                signature: get(&row, "signature")?,
                source: get(&row, "source")?,
                event_type: get(&row, "event_type")?,
                subscription_id: opt_subscription_id(get(&row, "subscription_id")?)?,
                job_id: JobId::from_uuid(get::<Uuid>(&row, "job_id")?),
                created_at: get(&row, "created_at")?,
                last_processed_at: get(&row, "last_processed_at")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self, record), fields(job_id = %record.job_id), err)]
    async fn insert_idempotency(&self, record: &WebhookIdempotency) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO webhook_idempotency
                (signature, source, event_type, subscription_id, job_id, created_at, last_processed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&record.signature)
        .bind(&record.source)
        .bind(&record.event_type)
        .bind(record.subscription_id.as_ref().map(SubscriptionId::as_str))
        .bind(record.job_id.as_uuid())
        .bind(record.created_at)
        .bind(record.last_processed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_idempotency", e))?;
        Ok(())
    }

    #[instrument(skip(self, signature), err)]
    async fn touch_idempotency(&self, signature: &str, now: DateTime<Utc>) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE webhook_idempotency SET last_processed_at = $2 WHERE signature = $1")
            .bind(signature)
            .bind(now)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("touch_idempotency", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(signature.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_expired_idempotency(
        &self,
        created_before: DateTime<Utc>,
        strategy: CleanupStrategy,
    ) -> Result<u64, StoreError> {
        let sql = match strategy {
            CleanupStrategy::Conservative => {
                r#"
                DELETE FROM webhook_idempotency i
                USING webhook_jobs j
                WHERE i.job_id = j.id AND j.status = 'DONE' AND i.created_at < $1
                "#
            }
            CleanupStrategy::Aggressive => "DELETE FROM webhook_idempotency WHERE created_at < $1",
        };
        let result = sqlx::query(sql)
            .bind(created_before)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete_expired_idempotency", e))?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SyncOperationStore for PgStore {
    #[instrument(skip(self), err)]
    async fn pending_operations(&self, limit: usize) -> Result<Vec<SyncOperation>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {OPERATION_COLUMNS} FROM sync_operations \
             WHERE status = 'PENDING' ORDER BY created_at ASC, id ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("pending_operations", e))?;
        rows.iter().map(operation_from_row).collect()
    }

    #[instrument(skip(self, operation), fields(operation_id = %operation.id, status = %operation.status), err)]
    async fn update_operation(&self, operation: &SyncOperation) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE sync_operations
            SET status = $2, retry_count = $3, error_message = $4, executed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(operation.id.as_uuid())
        .bind(operation.status.as_str())
        .bind(to_i32(operation.retry_count))
        .bind(&operation.error_message)
        .bind(operation.executed_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_operation", e))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(operation.id.to_string()));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn operation_stats(&self) -> Result<SyncOperationStats, StoreError> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS count FROM sync_operations GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("operation_stats", e))?;

        let mut stats = SyncOperationStats::default();
        for row in &rows {
            let status: String = get(row, "status")?;
            let count: i64 = get(row, "count")?;
            stats.record(parse_code(&status)?, count.max(0) as u64);
        }
        Ok(stats)
    }
}

fn job_from_row(row: &PgRow) -> Result<WebhookJob, StoreError> {
    let status: String = get(row, "status")?;
    Ok(WebhookJob {
        id: JobId::from_uuid(get(row, "id")?),
        source: get(row, "source")?,
        event_type: get(row, "event_type")?,
        subscription_id: opt_subscription_id(get(row, "subscription_id")?)?,
        payload: get(row, "payload")?,
        status: parse_code(&status)?,
        attempts: to_u32(get(row, "attempts")?),
        next_run_at: get(row, "next_run_at")?,
        last_error: get(row, "last_error")?,
        created_at: get(row, "created_at")?,
        updated_at: get(row, "updated_at")?,
    })
}

fn operation_from_row(row: &PgRow) -> Result<SyncOperation, StoreError> {
    let subscription_id: String = get(row, "subscription_id")?;
    let kind: String = get(row, "kind")?;
    let sku: String = get(row, "sku")?;
    let status: String = get(row, "status")?;
    Ok(SyncOperation {
        id: SyncOperationId::from_uuid(get(row, "id")?),
        subscription_id: SubscriptionId::parse(subscription_id)
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        kind: parse_code(&kind)?,
        sku: Sku::parse(sku).map_err(|e| StoreError::Serialization(e.to_string()))?,
        quantity: get(row, "quantity")?,
        status: parse_code(&status)?,
        retry_count: to_u32(get(row, "retry_count")?),
        error_message: get(row, "error_message")?,
        created_at: get(row, "created_at")?,
        executed_at: get(row, "executed_at")?,
    })
}

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::Serialization(format!("failed to read {column}: {e}")))
}

fn parse_code<T>(raw: &str) -> Result<T, StoreError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| StoreError::Serialization(e.to_string()))
}

fn opt_subscription_id(raw: Option<String>) -> Result<Option<SubscriptionId>, StoreError> {
    raw.map(|id| SubscriptionId::parse(id).map_err(|e| StoreError::Serialization(e.to_string())))
        .transpose()
}

fn to_u32(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => StoreError::AlreadyExists(msg),
                _ => StoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => StoreError::Storage(format!("connection pool closed in {operation}")),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Serialization(format!("column {index} in {operation}: {source}"))
        }
        other => StoreError::Storage(format!("{operation}: {other}")),
    }
}
