//! Process-wide gate in front of the billing provider.
//!
//! The provider rate-limits globally, so every caller (periodic sweep, webhook
//! worker) must go through one gate. Holding an [`ApiPermit`] is the only way
//! to call the provider: client methods take `&ApiPermit`, so a component that
//! already holds the permit passes it down instead of acquiring again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum GateError {
    #[error("billing-provider gate not acquired within {0:?}")]
    Timeout(Duration),
}

/// Bounded-wait mutual exclusion for billing-provider access.
#[derive(Debug, Clone, Default)]
pub struct ApiGate {
    inner: Arc<Mutex<()>>,
}

/// Proof of exclusive billing-provider access. Released on drop.
#[derive(Debug)]
pub struct ApiPermit {
    _guard: OwnedMutexGuard<()>,
    holder: &'static str,
    acquired_at: Instant,
}

impl ApiGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait at most `wait` for the gate.
    pub async fn acquire(&self, holder: &'static str, wait: Duration) -> Result<ApiPermit, GateError> {
        let guard = tokio::time::timeout(wait, self.inner.clone().lock_owned())
            .await
            .map_err(|_| GateError::Timeout(wait))?;
        debug!(holder, "billing-provider gate acquired");
        Ok(ApiPermit {
            _guard: guard,
            holder,
            acquired_at: Instant::now(),
        })
    }

    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl Drop for ApiPermit {
    fn drop(&mut self) {
        debug!(
            holder = self.holder,
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "billing-provider gate released"
        );
    }
}
