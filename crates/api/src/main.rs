use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use invsync_api::app::{self, ApiStore, AppServices};
use invsync_infra::jobs::SUBSCRIPTION_UPDATE;
use invsync_infra::storefront::Storefront;
use invsync_infra::{
    ApiGate, AppConfig, BillingClient, BillingCredentials, IdempotencyCleanup, InMemoryStore, PgStore, ReconciliationSweep,
    ReqwestTransport, Scheduler, SchedulerHandle, ShopifyStorefront, SubscriptionUpdateHandler, SyncOperationProcessor,
    WebhookWorker,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    invsync_observability::init();

    let config = AppConfig::from_env().context("loading configuration")?;

    match config.database_url.clone() {
        Some(url) => {
            let store = PgStore::connect(&url).await.context("connecting to postgres")?;
            store.migrate().await.context("applying schema")?;
            info!("using postgres store");
            run(Arc::new(store), config).await
        }
        None => {
            tracing::warn!("DATABASE_URL not set; state is kept in memory only");
            run(Arc::new(InMemoryStore::new()), config).await
        }
    }
}

async fn run<S: ApiStore>(store: Arc<S>, config: AppConfig) -> anyhow::Result<()> {
    let storefront: Arc<dyn Storefront> =
        Arc::new(ShopifyStorefront::new(&config.storefront).context("building storefront client")?);

    let scheduler = start_tasks(store.clone(), storefront.clone(), &config)?;

    let services = Arc::new(AppServices::new(
        store,
        storefront,
        config.billing.hmac_key.clone(),
        config.jobs.stuck_threshold,
    ));
    let app = app::build_app(services);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    scheduler.shutdown().await;
    Ok(())
}

fn start_tasks<S: ApiStore>(
    store: Arc<S>,
    storefront: Arc<dyn Storefront>,
    config: &AppConfig,
) -> anyhow::Result<SchedulerHandle> {
    let gate = ApiGate::new();
    let billing_cfg = &config.billing;

    let transport = ReqwestTransport::new(&billing_cfg.base_url, billing_cfg.request_timeout, billing_cfg.connect_timeout)
        .context("building billing transport")?;
    let billing = BillingClient::new(
        transport,
        BillingCredentials {
            secret: billing_cfg.secret.clone(),
            token: billing_cfg.token.clone(),
        },
        billing_cfg.backoff.clone(),
    );

    let worker = WebhookWorker::new(store.clone(), gate.clone(), billing_cfg.gate_timeout, config.jobs.clone())
        .with_handler(SUBSCRIPTION_UPDATE, Arc::new(SubscriptionUpdateHandler::new(store.clone())));
    let sweep = ReconciliationSweep::new(
        store.clone(),
        billing,
        gate,
        billing_cfg.gate_timeout,
        billing_cfg.backoff.clone(),
    );
    let processor = SyncOperationProcessor::new(store.clone(), storefront, config.sync_batch_size);
    let cleanup = IdempotencyCleanup::new(store, config.idempotency.ttl, config.idempotency.strategy);

    let schedule = &config.schedule;
    Ok(Scheduler::new()
        .add("webhook-jobs", schedule.webhook_jobs, Arc::new(worker))
        .add("reconciliation-sweep", schedule.reconciliation, Arc::new(sweep))
        .add("sync-operations", schedule.sync_operations, Arc::new(processor))
        .add("idempotency-cleanup", schedule.idempotency_cleanup, Arc::new(cleanup))
        .start())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
