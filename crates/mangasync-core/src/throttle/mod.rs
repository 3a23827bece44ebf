//! Per-source throttle.
//!
//! Each remote source gets a gate bounding (a) concurrent in-flight requests
//! and (b) the minimum spacing between successive request starts. Spacing is
//! measured from acquisition, so short bursty requests cannot defeat it.
//! Gates are created lazily and are fully independent of each other; one
//! throttle instance is shared by every run so update and download runs
//! against the same source respect the same budget.

mod gate;
mod limits;
mod permit;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::futures::Notified;
use tokio::sync::Notify;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::source::SourceId;

use gate::SourceGate;

pub use gate::{NotReady, ThrottleStats};
pub use limits::ThrottleLimits;
pub use permit::ThrottlePermit;

#[derive(Debug)]
pub struct SourceThrottle {
    defaults: ThrottleLimits,
    overrides: HashMap<SourceId, ThrottleLimits>,
    gates: Mutex<HashMap<SourceId, Arc<SourceGate>>>,
    released: Arc<Notify>,
}

impl SourceThrottle {
    pub fn new(defaults: ThrottleLimits) -> Self {
        Self::with_overrides(defaults, HashMap::new())
    }

    pub fn with_overrides(defaults: ThrottleLimits, overrides: HashMap<SourceId, ThrottleLimits>) -> Self {
        Self {
            defaults,
            overrides,
            gates: Mutex::new(HashMap::new()),
            released: Arc::new(Notify::new()),
        }
    }

    pub fn limits_for(&self, source: SourceId) -> ThrottleLimits {
        self.overrides.get(&source).copied().unwrap_or(self.defaults)
    }

    fn gate(&self, source: SourceId) -> Arc<SourceGate> {
        let mut gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        let limits = self.limits_for(source);
        Arc::clone(
            gates
                .entry(source)
                .or_insert_with(|| Arc::new(SourceGate::new(limits))),
        )
    }

    /// Take a permit if both the concurrency budget and spacing allow it right now.
    pub fn try_acquire(&self, source: SourceId) -> Result<ThrottlePermit, NotReady> {
        let gate = self.gate(source);
        gate.try_start(Instant::now())?;
        Ok(ThrottlePermit::new(source, gate, Arc::clone(&self.released)))
    }

    /// Park until a permit for `source` is available.
    pub async fn acquire(&self, source: SourceId) -> ThrottlePermit {
        loop {
            if let Some(permit) = self.wait_for_permit(source, None).await {
                return permit;
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but gives up (returning None) once `cancel` fires.
    pub async fn acquire_or_cancel(
        &self,
        source: SourceId,
        cancel: &CancellationToken,
    ) -> Option<ThrottlePermit> {
        self.wait_for_permit(source, Some(cancel)).await
    }

    async fn wait_for_permit(
        &self,
        source: SourceId,
        cancel: Option<&CancellationToken>,
    ) -> Option<ThrottlePermit> {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if cancel.is_some_and(|c| c.is_cancelled()) {
                return None;
            }
            let retry_at = match self.try_acquire(source) {
                Ok(permit) => return Some(permit),
                Err(NotReady::Busy) => None,
                Err(NotReady::SpacedUntil(at)) => Some(at),
            };

            tokio::select! {
                _ = notified.as_mut() => {}
                _ = sleep_until_opt(retry_at) => {}
                _ = cancelled_opt(cancel) => return None,
            }
        }
    }

    /// Future that resolves the next time any permit is released.
    /// Create it before probing with `try_acquire` to avoid missing a wakeup.
    pub fn released(&self) -> Notified<'_> {
        self.released.notified()
    }

    pub fn stats(&self, source: SourceId) -> ThrottleStats {
        let gates = self.gates.lock().unwrap_or_else(|e| e.into_inner());
        gates
            .get(&source)
            .map(|g| g.stats())
            .unwrap_or_default()
    }
}

impl Default for SourceThrottle {
    fn default() -> Self {
        Self::new(ThrottleLimits::default())
    }
}

async fn cancelled_opt(cancel: Option<&CancellationToken>) {
    match cancel {
        Some(token) => token.cancelled().await,
        None => std::future::pending::<()>().await,
    }
}

/// Sleep until `at`, or forever when there is no deadline.
pub(crate) async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}
