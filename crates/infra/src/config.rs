//! Configuration loading and representation.
//!
//! Everything comes from environment variables. [`AppConfig::from_lookup`]
//! takes any key → value function so tests never touch the process env.

use std::net::SocketAddr;
use std::time::Duration;

use crate::billing::BackoffPolicy;
use crate::idempotency::CleanupStrategy;
use crate::jobs::{RetryPolicy, UnknownEventPolicy};

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub base_url: String,
    pub secret: String,
    pub token: String,
    pub hmac_key: String,
    pub backoff: BackoffPolicy,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub gate_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    pub store_url: String,
    pub api_version: String,
    pub access_token: String,
    pub location_id: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub retry: RetryPolicy,
    pub batch_size: usize,
    pub unknown_event_policy: UnknownEventPolicy,
    pub stuck_threshold: Duration,
}

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    pub strategy: CleanupStrategy,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub webhook_jobs: Duration,
    pub sync_operations: Duration,
    pub reconciliation: Duration,
    pub idempotency_cleanup: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: Option<String>,
    pub billing: BillingConfig,
    pub storefront: StorefrontConfig,
    pub jobs: JobConfig,
    pub sync_batch_size: usize,
    pub idempotency: IdempotencyConfig,
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };

        let backoff = BackoffPolicy {
            max_attempts: env.parsed("BILLING_MAX_RETRIES", 5)?,
            base_delay: env.millis("BILLING_BASE_BACKOFF_MS", 5_000)?,
            max_delay: env.millis("BILLING_MAX_BACKOFF_MS", 120_000)?,
            request_delay: env.millis("BILLING_REQUEST_DELAY_MS", 500)?,
            page_delay: env.millis("BILLING_PAGE_DELAY_MS", 2_000)?,
            ..BackoffPolicy::default()
        };

        let billing = BillingConfig {
            base_url: trim_slash(env.required("PAGBRASIL_URL")?),
            secret: env.required("PAGBRASIL_SECRET")?,
            token: env.required("PAGBRASIL_TOKEN")?,
            hmac_key: env.required("PAGBRASIL_HMAC_KEY")?,
            backoff,
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            gate_timeout: env.millis("API_GATE_TIMEOUT_MS", 30_000)?,
        };

        let storefront = StorefrontConfig {
            store_url: trim_slash(env.required("SHOPIFY_STORE_URL")?),
            api_version: env.string("SHOPIFY_API_VERSION", "2025-01"),
            access_token: env.required("SHOPIFY_ACCESS_TOKEN")?,
            location_id: env.required("SHOPIFY_LOCATION_ID")?,
            request_timeout: Duration::from_secs(30),
        };

        let unknown_event_policy = match env.string("WEBHOOK_UNKNOWN_EVENT_POLICY", "retry").as_str() {
            "retry" => UnknownEventPolicy::Retry,
            "dead" => UnknownEventPolicy::DeadLetter,
            other => {
                return Err(ConfigError::Invalid {
                    name: "WEBHOOK_UNKNOWN_EVENT_POLICY",
                    value: other.to_string(),
                });
            }
        };

        let jobs = JobConfig {
            retry: RetryPolicy {
                max_attempts: env.parsed("WEBHOOK_MAX_ATTEMPTS", 5)?,
                backoff_unit: env.secs("WEBHOOK_BACKOFF_UNIT_SECS", 60)?,
            },
            batch_size: env.parsed("WEBHOOK_BATCH_SIZE", 10)?,
            unknown_event_policy,
            stuck_threshold: env.secs("STUCK_JOB_THRESHOLD_SECS", 3_600)?,
        };

        let strategy_raw = env.string("IDEMPOTENCY_CLEANUP_STRATEGY", "conservative");
        let idempotency = IdempotencyConfig {
            ttl: Duration::from_secs(env.parsed::<u64>("IDEMPOTENCY_TTL_HOURS", 720)? * 3_600),
            strategy: strategy_raw.parse().map_err(|_| ConfigError::Invalid {
                name: "IDEMPOTENCY_CLEANUP_STRATEGY",
                value: strategy_raw.clone(),
            })?,
        };

        let schedule = ScheduleConfig {
            webhook_jobs: env.secs("WEBHOOK_POLL_INTERVAL_SECS", 30)?,
            sync_operations: env.secs("SYNC_POLL_INTERVAL_SECS", 30)?,
            reconciliation: env.secs("RECONCILE_INTERVAL_SECS", 120)?,
            idempotency_cleanup: env.secs("IDEMPOTENCY_CLEANUP_INTERVAL_SECS", 21_600)?,
        };

        Ok(Self {
            bind_addr: env.parsed("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 8080)))?,
            database_url: env.optional("DATABASE_URL"),
            billing,
            storefront,
            jobs,
            sync_batch_size: env.parsed("SYNC_BATCH_SIZE", 100)?,
            idempotency,
            schedule,
        })
    }
}

impl StorefrontConfig {
    pub fn graphql_endpoint(&self) -> String {
        format!("{}/admin/api/{}/graphql.json", self.store_url, self.api_version)
    }

    pub fn location_gid(&self) -> String {
        format!("gid://shopify/Location/{}", self.location_id)
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn optional(&self, name: &'static str) -> Option<String> {
        (self.lookup)(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, name: &'static str) -> Result<String, ConfigError> {
        self.optional(name).ok_or(ConfigError::Missing(name))
    }

    fn string(&self, name: &'static str, default: &str) -> String {
        self.optional(name).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T: std::str::FromStr>(&self, name: &'static str, default: T) -> Result<T, ConfigError> {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid { name, value: raw }),
        }
    }

    fn millis(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed(name, default).map(Duration::from_millis)
    }

    fn secs(&self, name: &'static str, default: u64) -> Result<Duration, ConfigError> {
        self.parsed(name, default).map(Duration::from_secs)
    }
}

fn trim_slash(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn required() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("PAGBRASIL_URL", "https://billing.example.com/"),
            ("PAGBRASIL_SECRET", "s3cret"),
            ("PAGBRASIL_TOKEN", "tok"),
            ("PAGBRASIL_HMAC_KEY", "hmac"),
            ("SHOPIFY_STORE_URL", "https://shop.example.com"),
            ("SHOPIFY_ACCESS_TOKEN", "shpat"),
            ("SHOPIFY_LOCATION_ID", "777"),
        ])
    }

    fn load(vars: HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn defaults_apply_when_only_required_vars_are_set() {
        let cfg = load(required()).unwrap();
        assert_eq!(cfg.billing.base_url, "https://billing.example.com");
        assert_eq!(cfg.billing.backoff.max_attempts, 5);
        assert_eq!(cfg.billing.backoff.base_delay, Duration::from_secs(5));
        assert_eq!(cfg.billing.backoff.max_delay, Duration::from_secs(120));
        assert_eq!(cfg.jobs.retry.max_attempts, 5);
        assert_eq!(cfg.jobs.retry.backoff_unit, Duration::from_secs(60));
        assert_eq!(cfg.jobs.unknown_event_policy, UnknownEventPolicy::Retry);
        assert_eq!(cfg.schedule.reconciliation, Duration::from_secs(120));
        assert_eq!(cfg.idempotency.ttl, Duration::from_secs(720 * 3_600));
        assert_eq!(cfg.idempotency.strategy, CleanupStrategy::Conservative);
        assert!(cfg.database_url.is_none());
        assert_eq!(
            cfg.storefront.graphql_endpoint(),
            "https://shop.example.com/admin/api/2025-01/graphql.json"
        );
        assert_eq!(cfg.storefront.location_gid(), "gid://shopify/Location/777");
    }

    #[test]
    fn missing_required_var_is_reported_by_name() {
        let mut vars = required();
        vars.remove("PAGBRASIL_TOKEN");
        assert_eq!(load(vars).unwrap_err(), ConfigError::Missing("PAGBRASIL_TOKEN"));
    }

    #[test]
    fn blank_values_count_as_missing() {
        let mut vars = required();
        vars.insert("SHOPIFY_LOCATION_ID", "   ");
        assert_eq!(load(vars).unwrap_err(), ConfigError::Missing("SHOPIFY_LOCATION_ID"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = required();
        vars.insert("WEBHOOK_MAX_ATTEMPTS", "2");
        vars.insert("WEBHOOK_UNKNOWN_EVENT_POLICY", "dead");
        vars.insert("IDEMPOTENCY_CLEANUP_STRATEGY", "aggressive");
        vars.insert("BIND_ADDR", "127.0.0.1:9000");
        vars.insert("DATABASE_URL", "postgres://localhost/invsync");
        let cfg = load(vars).unwrap();
        assert_eq!(cfg.jobs.retry.max_attempts, 2);
        assert_eq!(cfg.jobs.unknown_event_policy, UnknownEventPolicy::DeadLetter);
        assert_eq!(cfg.idempotency.strategy, CleanupStrategy::Aggressive);
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/invsync"));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let mut vars = required();
        vars.insert("RECONCILE_INTERVAL_SECS", "soon");
        assert_eq!(
            load(vars).unwrap_err(),
            ConfigError::Invalid {
                name: "RECONCILE_INTERVAL_SECS",
                value: "soon".into()
            }
        );
    }
}
