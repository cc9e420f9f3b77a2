//! Explicit scheduler owning named periodic tasks.
//!
//! Fixed-delay semantics: a task's next run starts one interval after its
//! previous run finished, so runs of one task never overlap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::billing::BillingProvider;
use crate::idempotency::IdempotencyCleanup;
use crate::jobs::WebhookWorker;
use crate::reconciliation::ReconciliationSweep;
use crate::storefront::Storefront;
use crate::store::{ControlledSkuCatalog, IdempotencyStore, JobStore, SubscriptionStore, SyncOperationStore};
use crate::sync::SyncOperationProcessor;

/// One unit of periodic work. Failures are logged by the task itself.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    async fn run(&self);
}

#[async_trait]
impl<S: JobStore + 'static> PeriodicTask for WebhookWorker<S> {
    async fn run(&self) {
        if let Err(err) = self.run_once().await {
            error!(error = %err, "webhook job drain failed");
        }
    }
}

#[async_trait]
impl<S, B> PeriodicTask for ReconciliationSweep<S, B>
where
    S: SubscriptionStore + ControlledSkuCatalog + 'static,
    B: BillingProvider + 'static,
{
    async fn run(&self) {
        self.run_cycle().await;
    }
}

#[async_trait]
impl<S, F> PeriodicTask for SyncOperationProcessor<S, F>
where
    S: SyncOperationStore + 'static,
    F: Storefront + 'static,
{
    async fn run(&self) {
        if let Err(err) = self.run_once().await {
            error!(error = %err, "sync operation drain failed");
        }
    }
}

#[async_trait]
impl<S: IdempotencyStore + 'static> PeriodicTask for IdempotencyCleanup<S> {
    async fn run(&self) {
        if let Err(err) = self.run_once(Utc::now()).await {
            error!(error = %err, "idempotency cleanup failed");
        }
    }
}

struct Entry {
    name: &'static str,
    interval: Duration,
    task: Arc<dyn PeriodicTask>,
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<Entry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, name: &'static str, interval: Duration, task: Arc<dyn PeriodicTask>) -> Self {
        self.entries.push(Entry { name, interval, task });
        self
    }

    /// Spawn one loop per task; each runs once immediately.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let joins = self
            .entries
            .into_iter()
            .map(|entry| {
                let name = entry.name;
                info!(task = name, interval_secs = entry.interval.as_secs(), "scheduling task");
                (name, tokio::spawn(task_loop(entry, shutdown_rx.clone())))
            })
            .collect();

        SchedulerHandle {
            shutdown: shutdown_tx,
            joins,
        }
    }
}

async fn task_loop(entry: Entry, mut shutdown: watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            break;
        }
        debug!(task = entry.name, "task run starting");
        entry.task.run().await;

        tokio::select! {
            _ = tokio::time::sleep(entry.interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(task = entry.name, "task loop stopped");
}

/// Handle to running task loops.
#[derive(Debug)]
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    joins: Vec<(&'static str, JoinHandle<()>)>,
}

impl SchedulerHandle {
    /// Stop every loop after its current run and wait for them.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, join) in self.joins {
            if let Err(err) = join.await {
                error!(task = name, error = %err, "task loop panicked");
            }
        }
        info!("scheduler stopped");
    }
}
