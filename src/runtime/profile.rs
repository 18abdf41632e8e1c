//! Phase timings for orchestrator passes.
//!
//! Timings are always returned to the caller. They are logged at `info` on
//! the `contract_sync::profile` target when debug profiling is enabled and at
//! `trace` otherwise.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
pub struct Profile {
    debug: bool,
}

impl Profile {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn start(&self, phase: impl Into<String>) -> PhaseTimer {
        PhaseTimer {
            phase: phase.into(),
            started: Instant::now(),
            debug: self.debug,
        }
    }
}

#[must_use = "a phase timer records nothing until finished"]
pub struct PhaseTimer {
    phase: String,
    started: Instant,
    debug: bool,
}

impl PhaseTimer {
    pub fn finish(self) -> PhaseTiming {
        let elapsed = self.started.elapsed();
        let elapsed_ms = elapsed.as_millis().min(u128::from(u64::MAX)) as u64;
        if self.debug {
            tracing::info!(target: "contract_sync::profile", phase = %self.phase, elapsed_ms, "phase finished");
        } else {
            tracing::trace!(target: "contract_sync::profile", phase = %self.phase, elapsed_ms, "phase finished");
        }
        PhaseTiming {
            phase: self.phase,
            elapsed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseTiming {
    pub phase: String,
    pub elapsed: Duration,
}
