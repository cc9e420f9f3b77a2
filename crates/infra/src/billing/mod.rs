//! Rate-limited billing-provider client.
//!
//! Every call retries with capped exponential backoff and jitter, honours the
//! provider's `Retry-After` hint on 429, and reports failure as `None`: callers
//! must read absence as "unknown, try later", never as "confirmed empty".

mod backoff;
mod transport;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use invsync_core::SubscriptionId;
use invsync_subscriptions::{ProviderSubscription, SubscriptionPage, SubscriptionStatus};

use crate::gate::ApiPermit;

pub use backoff::{BackoffPolicy, RateLimitWait, jitter, parse_retry_after};
pub use transport::{BillingTransport, ReqwestTransport, TransportError, TransportResponse};

/// Upper bound on pages walked for one status.
const MAX_PAGES: u32 = 1_000;

/// Billing-provider operations used by reconciliation.
#[async_trait]
pub trait BillingProvider: Send + Sync {
    /// One page of ids for a status; `Some(vec![])` marks the end.
    async fn fetch_page(
        &self,
        permit: &ApiPermit,
        status: SubscriptionStatus,
        page: u32,
    ) -> Option<Vec<SubscriptionId>>;

    /// Every id for a status. `None` if any page failed.
    async fn fetch_ids_by_status(
        &self,
        permit: &ApiPermit,
        status: SubscriptionStatus,
    ) -> Option<Vec<SubscriptionId>>;

    async fn fetch_by_id(&self, permit: &ApiPermit, id: &SubscriptionId) -> Option<ProviderSubscription>;
}

#[derive(Debug, Clone)]
pub struct BillingCredentials {
    pub secret: String,
    pub token: String,
}

pub struct BillingClient<T: BillingTransport = ReqwestTransport> {
    transport: T,
    credentials: BillingCredentials,
    policy: BackoffPolicy,
}

impl<T: BillingTransport> BillingClient<T> {
    pub fn new(transport: T, credentials: BillingCredentials, policy: BackoffPolicy) -> Self {
        Self {
            transport,
            credentials,
            policy,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    fn base_form(&self) -> Vec<(&'static str, String)> {
        vec![
            ("secret", self.credentials.secret.clone()),
            ("pbtoken", self.credentials.token.clone()),
            ("response_type", "JSON".to_string()),
        ]
    }

    /// POST with retries. Returns the body of the first 2xx response.
    async fn call(&self, form: &[(&'static str, String)]) -> Option<String> {
        let mut rate_limited = false;

        for attempt in 0..self.policy.max_attempts {
            let last = !self.policy.should_retry(attempt);
            let wait = match self.transport.post_form(form).await {
                Ok(resp) if resp.is_success() => {
                    if rate_limited {
                        debug!(cooldown_ms = self.policy.rate_limit_cooldown.as_millis() as u64, "cooling down after rate limit");
                        tokio::time::sleep(self.policy.rate_limit_cooldown).await;
                    }
                    return Some(resp.body);
                }
                Ok(resp) if resp.is_rate_limited() => {
                    rate_limited = true;
                    match self.policy.rate_limit_wait(resp.retry_after.as_deref(), attempt) {
                        RateLimitWait::Abort(hint) => {
                            warn!(
                                attempt,
                                retry_after_secs = hint.as_secs(),
                                max_backoff_secs = self.policy.max_delay.as_secs(),
                                "rate-limit hint exceeds ceiling, aborting call"
                            );
                            return None;
                        }
                        RateLimitWait::Hinted(hint) => {
                            warn!(attempt, retry_after_secs = hint.as_secs(), "rate limited");
                            hint
                        }
                        RateLimitWait::Backoff(delay) => {
                            let delay = jitter(delay);
                            warn!(attempt, backoff_ms = delay.as_millis() as u64, "rate limited without hint");
                            delay
                        }
                    }
                }
                Ok(resp) => {
                    warn!(attempt, status = resp.status, "billing provider returned error status");
                    jitter(self.policy.delay_for_attempt(attempt))
                }
                Err(err) => {
                    warn!(attempt, error = %err, "billing provider call failed");
                    jitter(self.policy.delay_for_attempt(attempt))
                }
            };

            if last {
                break;
            }
            tokio::time::sleep(wait).await;
        }

        warn!(attempts = self.policy.max_attempts, rate_limited, "billing provider attempts exhausted");
        if rate_limited {
            tokio::time::sleep(self.policy.rate_limit_exhausted_pause).await;
        }
        None
    }
}

#[async_trait]
impl<T: BillingTransport> BillingProvider for BillingClient<T> {
    #[instrument(skip(self, _permit), fields(status = %status))]
    async fn fetch_page(
        &self,
        _permit: &ApiPermit,
        status: SubscriptionStatus,
        page: u32,
    ) -> Option<Vec<SubscriptionId>> {
        let mut form = self.base_form();
        form.push(("status", status.code().to_string()));
        form.push(("page", page.to_string()));

        let body = self.call(&form).await?;
        if body.trim().is_empty() || body.trim() == "null" {
            return Some(Vec::new());
        }
        match serde_json::from_str::<SubscriptionPage>(&body) {
            Ok(parsed) => Some(parsed.ids()),
            Err(err) => {
                warn!(page, error = %err, "unreadable subscription list page");
                None
            }
        }
    }

    #[instrument(skip(self, permit), fields(status = %status))]
    async fn fetch_ids_by_status(
        &self,
        permit: &ApiPermit,
        status: SubscriptionStatus,
    ) -> Option<Vec<SubscriptionId>> {
        let mut ids = Vec::new();
        for page in 1..=MAX_PAGES {
            let batch = self.fetch_page(permit, status, page).await?;
            if batch.is_empty() {
                break;
            }
            debug!(page, count = batch.len(), "subscription page fetched");
            ids.extend(batch);
            tokio::time::sleep(jitter(self.policy.page_delay)).await;
        }
        info!(count = ids.len(), "subscription list fetched");
        Some(ids)
    }

    #[instrument(skip(self, _permit), fields(subscription_id = %id))]
    async fn fetch_by_id(&self, _permit: &ApiPermit, id: &SubscriptionId) -> Option<ProviderSubscription> {
        let mut form = self.base_form();
        form.push(("subscription", id.to_string()));

        let body = self.call(&form).await?;
        match serde_json::from_str::<ProviderSubscription>(&body) {
            Ok(doc) => Some(doc),
            Err(err) => {
                warn!(error = %err, "unreadable subscription document");
                None
            }
        }
    }
}
