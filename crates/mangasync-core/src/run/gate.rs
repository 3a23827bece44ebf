//! Per-kind run state machine.
//!
//! `Idle → Running → Draining → Finished → Idle`, with
//! `Running → Cancelling → Draining` on cancellation. Every transition is a
//! single compare-exchange, so check-and-start cannot race.

use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RunPhase {
    Idle = 0,
    Running = 1,
    Cancelling = 2,
    Draining = 3,
    Finished = 4,
}

impl RunPhase {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RunPhase::Running,
            2 => RunPhase::Cancelling,
            3 => RunPhase::Draining,
            4 => RunPhase::Finished,
            _ => RunPhase::Idle,
        }
    }

    /// A run occupies the slot in every phase except `Idle`.
    pub fn is_active(self) -> bool {
        self != RunPhase::Idle
    }
}

#[derive(Debug)]
pub struct RunGate {
    phase: AtomicU8,
}

impl Default for RunGate {
    fn default() -> Self {
        Self {
            phase: AtomicU8::new(RunPhase::Idle as u8),
        }
    }
}

impl RunGate {
    pub fn phase(&self) -> RunPhase {
        RunPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move `from → to`; false (and no change) if the gate was not in `from`.
    pub fn transition(&self, from: RunPhase, to: RunPhase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the slot: `Idle → Running`.
    pub fn try_begin(&self) -> bool {
        self.transition(RunPhase::Idle, RunPhase::Running)
    }

    /// `Running | Cancelling → Draining`. Returns the phase drained from.
    pub fn begin_drain(&self) -> RunPhase {
        for from in [RunPhase::Running, RunPhase::Cancelling] {
            if self.transition(from, RunPhase::Draining) {
                return from;
            }
        }
        self.phase()
    }

    /// `Draining → Finished → Idle`, called once history is durably written.
    pub fn finish(&self) {
        if self.transition(RunPhase::Draining, RunPhase::Finished) {
            self.transition(RunPhase::Finished, RunPhase::Idle);
        }
    }

    /// Drop a claimed slot that never got going (start-up failure).
    pub(crate) fn abort_start(&self) {
        if !self.transition(RunPhase::Running, RunPhase::Idle) {
            self.transition(RunPhase::Cancelling, RunPhase::Idle);
        }
    }
}

/// Releases a freshly claimed slot when dropped, unless disarmed once the
/// run driver has taken ownership of the gate.
pub(crate) struct StartGuard<'a> {
    gate: &'a RunGate,
    armed: bool,
}

impl<'a> StartGuard<'a> {
    pub(crate) fn new(gate: &'a RunGate) -> Self {
        Self { gate, armed: true }
    }

    pub(crate) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.gate.abort_start();
        }
    }
}
