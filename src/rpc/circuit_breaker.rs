use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Current state of the breaker guarding the Ethereum node.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Copy, Clone)]
pub struct CircuitBreakerSnapshot {
    pub state: CircuitState,
    pub consecutive_failures: usize,
    /// Time left before an open breaker admits a probe request.
    pub cooldown_remaining: Option<Duration>,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: usize,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

/// Returned when the breaker rejects a request.
#[derive(Debug, thiserror::Error)]
#[error("rpc circuit breaker is open")]
pub struct CircuitOpen;

/// Closed/Open/Half-Open breaker shared by every request of one client.
///
/// Opens after `failure_threshold` consecutive failures, then admits a single
/// probe once `cooldown` elapsed. The probe's outcome closes or re-opens it.
#[derive(Debug, Clone)]
pub struct RpcCircuitBreaker {
    state: Arc<Mutex<BreakerState>>,
    failure_threshold: usize,
    cooldown: Duration,
}

impl Default for RpcCircuitBreaker {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(30))
    }
}

impl RpcCircuitBreaker {
    pub fn new(failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            })),
            failure_threshold: failure_threshold.max(1),
            cooldown: cooldown.max(Duration::from_millis(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().expect("circuit breaker mutex poisoned")
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let guard = self.lock();
        let cooldown_remaining = match (guard.state, guard.opened_at) {
            (CircuitState::Open, Some(opened_at)) => {
                Some(self.cooldown.saturating_sub(opened_at.elapsed()))
            }
            _ => None,
        };
        CircuitBreakerSnapshot {
            state: guard.state,
            consecutive_failures: guard.consecutive_failures,
            cooldown_remaining,
        }
    }

    /// Asks for permission to send a request.
    pub fn permit(&self) -> Result<CircuitState, CircuitOpen> {
        let mut guard = self.lock();

        match guard.state {
            CircuitState::Closed => Ok(CircuitState::Closed),
            CircuitState::Open => {
                let cooled = guard
                    .opened_at
                    .map(|opened_at| opened_at.elapsed() >= self.cooldown)
                    .unwrap_or(true);
                if !cooled {
                    return Err(CircuitOpen);
                }
                self.transition(&mut guard, CircuitState::HalfOpen);
                guard.probe_in_flight = true;
                Ok(CircuitState::HalfOpen)
            }
            CircuitState::HalfOpen => {
                if guard.probe_in_flight {
                    return Err(CircuitOpen);
                }
                guard.probe_in_flight = true;
                Ok(CircuitState::HalfOpen)
            }
        }
    }

    pub fn record_success(&self) {
        let mut guard = self.lock();
        guard.consecutive_failures = 0;
        guard.probe_in_flight = false;
        if guard.state != CircuitState::Closed {
            guard.opened_at = None;
            self.transition(&mut guard, CircuitState::Closed);
        }
    }

    pub fn record_failure(&self) {
        let mut guard = self.lock();
        guard.consecutive_failures = guard.consecutive_failures.saturating_add(1);
        guard.probe_in_flight = false;

        let trip = match guard.state {
            CircuitState::HalfOpen => true,
            CircuitState::Closed => guard.consecutive_failures >= self.failure_threshold,
            CircuitState::Open => false,
        };
        if trip {
            guard.opened_at = Some(Instant::now());
            self.transition(&mut guard, CircuitState::Open);
        }
    }

    fn transition(&self, guard: &mut BreakerState, next: CircuitState) {
        if guard.state == next {
            return;
        }
        tracing::warn!(
            previous = ?guard.state,
            next = ?next,
            consecutive_failures = guard.consecutive_failures,
            "ethereum rpc circuit breaker state changed"
        );
        guard.state = next;
    }
}
