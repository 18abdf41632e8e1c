use crate::rpc::EthRpcClient;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a fmt tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present. Otherwise it logs at
/// `info`, or at `debug` for this crate when `debug` is set. Calling this
/// function multiple times is harmless.
pub fn init_tracing(debug: bool) {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let fallback = if debug {
        "info,contract_sync=debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters describing synchronization passes.
#[derive(Default, Debug)]
pub struct Telemetry {
    passes_started: AtomicU64,
    passes_completed: AtomicU64,
    passes_failed: AtomicU64,
    addresses_processed: AtomicU64,
    address_failures: AtomicU64,
    batch_calls: AtomicU64,
    token_failures: AtomicU64,
    coalesced_triggers: AtomicU64,
}

impl Telemetry {
    pub fn record_pass_started(&self) {
        self.passes_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass_completed(&self) {
        self.passes_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_pass_failed(&self) {
        self.passes_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_addresses(&self, processed: u64, failed: u64) {
        self.addresses_processed.fetch_add(processed, Ordering::Relaxed);
        self.address_failures.fetch_add(failed, Ordering::Relaxed);
    }

    pub fn record_batch_calls(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.batch_calls.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_token_failures(&self, count: u64) {
        self.token_failures.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_coalesced_trigger(&self) {
        self.coalesced_triggers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            passes_started: self.passes_started.load(Ordering::Relaxed),
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_failed: self.passes_failed.load(Ordering::Relaxed),
            addresses_processed: self.addresses_processed.load(Ordering::Relaxed),
            address_failures: self.address_failures.load(Ordering::Relaxed),
            batch_calls: self.batch_calls.load(Ordering::Relaxed),
            token_failures: self.token_failures.load(Ordering::Relaxed),
            coalesced_triggers: self.coalesced_triggers.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub passes_started: u64,
    pub passes_completed: u64,
    pub passes_failed: u64,
    pub addresses_processed: u64,
    pub address_failures: u64,
    pub batch_calls: u64,
    pub token_failures: u64,
    pub coalesced_triggers: u64,
}

/// Spawns a background task that periodically logs pass counters, address
/// throughput, and (when available) JSON-RPC metrics.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    rpc: Option<EthRpcClient>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "contract_sync::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let processed_delta = current
                        .addresses_processed
                        .saturating_sub(last_snapshot.addresses_processed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        processed_delta as f64 / elapsed
                    };

                    tracing::info!(
                        target: "contract_sync::metrics",
                        throughput = format!("{throughput:.2}"),
                        passes_completed = current.passes_completed,
                        passes_failed = current.passes_failed,
                        addresses_processed = current.addresses_processed,
                        address_failures = current.address_failures,
                        batch_calls = current.batch_calls,
                        token_failures = current.token_failures,
                        coalesced_triggers = current.coalesced_triggers,
                        "sync metrics snapshot"
                    );

                    if let Some(rpc) = &rpc {
                        let metrics = rpc.metrics();
                        tracing::info!(
                            target: "contract_sync::metrics",
                            requests = metrics.total_requests,
                            errors = metrics.total_errors,
                            timeouts = metrics.total_timeouts,
                            reverts = metrics.total_reverts,
                            average_latency_ms = format!("{:.2}", metrics.average_latency_ms),
                            error_rate = format!("{:.4}", metrics.error_rate),
                            breaker_state = ?metrics.breaker_state,
                            "rpc metrics snapshot"
                        );
                    }

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
