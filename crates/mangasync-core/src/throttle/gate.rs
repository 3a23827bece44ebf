//! Per-source gate state.

use std::sync::Mutex;
use tokio::time::Instant;

use super::ThrottleLimits;

/// Why a permit could not be granted right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotReady {
    /// Concurrency budget exhausted; wait for a release.
    Busy,
    /// Spacing interval not yet elapsed; earliest next start.
    SpacedUntil(Instant),
}

/// Counters exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThrottleStats {
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub requests_started: u64,
}

#[derive(Debug, Default)]
struct GateState {
    in_flight: usize,
    last_start: Option<Instant>,
    stats: ThrottleStats,
}

#[derive(Debug)]
pub(super) struct SourceGate {
    limits: ThrottleLimits,
    state: Mutex<GateState>,
}

impl SourceGate {
    pub(super) fn new(limits: ThrottleLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(GateState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn spacing_deadline(&self, state: &GateState, now: Instant) -> Option<Instant> {
        let last = state.last_start?;
        let ready_at = last + self.limits.min_interval;
        (ready_at > now).then_some(ready_at)
    }

    /// Claim one concurrency slot and stamp a request start.
    pub(super) fn try_start(&self, now: Instant) -> Result<(), NotReady> {
        let mut state = self.lock();
        if state.in_flight >= self.limits.max_concurrent {
            return Err(NotReady::Busy);
        }
        if let Some(at) = self.spacing_deadline(&state, now) {
            return Err(NotReady::SpacedUntil(at));
        }
        state.in_flight += 1;
        state.last_start = Some(now);
        state.stats.requests_started += 1;
        state.stats.in_flight = state.in_flight;
        state.stats.peak_in_flight = state.stats.peak_in_flight.max(state.in_flight);
        Ok(())
    }

    /// Stamp another request start under an already-held slot (retries).
    pub(super) fn restamp(&self, now: Instant) -> Result<(), Instant> {
        let mut state = self.lock();
        if let Some(at) = self.spacing_deadline(&state, now) {
            return Err(at);
        }
        state.last_start = Some(now);
        state.stats.requests_started += 1;
        Ok(())
    }

    pub(super) fn finish(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.stats.in_flight = state.in_flight;
    }

    pub(super) fn stats(&self) -> ThrottleStats {
        self.lock().stats
    }
}
