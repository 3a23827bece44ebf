//! RAII permit that releases the source's concurrency slot when dropped.

use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::source::SourceId;

use super::gate::SourceGate;

#[derive(Debug)]
pub struct ThrottlePermit {
    source: SourceId,
    gate: Arc<SourceGate>,
    released: Arc<Notify>,
}

impl ThrottlePermit {
    pub(super) fn new(source: SourceId, gate: Arc<SourceGate>, released: Arc<Notify>) -> Self {
        Self {
            source,
            gate,
            released,
        }
    }

    pub fn source(&self) -> SourceId {
        self.source
    }

    /// Wait for the spacing interval before issuing another request under this
    /// permit (used between retry attempts). The concurrency slot stays held.
    pub async fn pace(&mut self) {
        loop {
            match self.gate.restamp(Instant::now()) {
                Ok(()) => return,
                Err(at) => tokio::time::sleep_until(at).await,
            }
        }
    }
}

impl Drop for ThrottlePermit {
    fn drop(&mut self) {
        self.gate.finish();
        self.released.notify_waiters();
    }
}
