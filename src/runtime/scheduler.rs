//! Serializes synchronization passes.
//!
//! State machine: `Idle -> Running -> Idle`. A trigger while running queues
//! exactly one follow-up pass; further triggers while that follow-up is
//! pending are coalesced into it. Failed passes are logged and the scheduler
//! returns to `Idle`, ready for the next tick.

use crate::runtime::telemetry::Telemetry;
use futures::future::BoxFuture;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// One unit of work driven by the scheduler.
pub trait SyncPass: Send + Sync + 'static {
    fn run_pass(&self) -> BoxFuture<'_, anyhow::Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { queued: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerOutcome {
    /// The scheduler was idle; a pass started.
    Started,
    /// A pass was running; one follow-up pass is now queued.
    Queued,
    /// A follow-up was already queued; this trigger was absorbed by it.
    Coalesced,
}

struct Inner {
    pass: Arc<dyn SyncPass>,
    state: watch::Sender<SchedulerState>,
    telemetry: Arc<Telemetry>,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    pub fn new(pass: Arc<dyn SyncPass>, telemetry: Arc<Telemetry>) -> Self {
        let (state, _) = watch::channel(SchedulerState::Idle);
        Self {
            inner: Arc::new(Inner {
                pass,
                state,
                telemetry,
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    pub fn state(&self) -> SchedulerState {
        *self.inner.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.inner.state.subscribe()
    }

    /// Passes that ran to completion, successful or not.
    pub fn runs(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed) + self.inner.failed.load(Ordering::Relaxed)
    }

    pub fn failed_runs(&self) -> u64 {
        self.inner.failed.load(Ordering::Relaxed)
    }

    /// Requests a pass and returns immediately.
    pub fn trigger(&self) -> TriggerOutcome {
        let mut outcome = TriggerOutcome::Coalesced;
        self.inner.state.send_if_modified(|state| match *state {
            SchedulerState::Idle => {
                *state = SchedulerState::Running { queued: false };
                outcome = TriggerOutcome::Started;
                true
            }
            SchedulerState::Running { queued: false } => {
                *state = SchedulerState::Running { queued: true };
                outcome = TriggerOutcome::Queued;
                true
            }
            SchedulerState::Running { queued: true } => false,
        });

        match outcome {
            TriggerOutcome::Started => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.drive().await });
            }
            TriggerOutcome::Queued => tracing::debug!("pass running; queued one follow-up"),
            TriggerOutcome::Coalesced => {
                self.inner.telemetry.record_coalesced_trigger();
                tracing::debug!("follow-up pass already queued; trigger coalesced");
            }
        }
        outcome
    }

    /// Resolves once no pass is running or queued.
    pub async fn wait_idle(&self) {
        let mut receiver = self.subscribe();
        let _ = receiver
            .wait_for(|state| *state == SchedulerState::Idle)
            .await;
    }

    /// Triggers a pass every `interval` (first tick immediately) until `shutdown`.
    pub fn spawn_ticker(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        tracing::info!("scheduler ticker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let outcome = scheduler.trigger();
                        tracing::trace!(?outcome, "scheduled trigger");
                    }
                }
            }
        })
    }
}

impl Inner {
    async fn drive(self: Arc<Self>) {
        loop {
            self.run_once().await;

            let mut again = false;
            self.state.send_modify(|state| {
                if *state == (SchedulerState::Running { queued: true }) {
                    *state = SchedulerState::Running { queued: false };
                    again = true;
                } else {
                    *state = SchedulerState::Idle;
                }
            });
            if !again {
                break;
            }
        }
    }

    async fn run_once(&self) {
        let pass = Arc::clone(&self.pass);
        match tokio::spawn(async move { pass.run_pass().await }).await {
            Ok(Ok(())) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(err)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %format!("{err:#}"), "sync pass failed");
            }
            Err(join_err) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(error = %join_err, "sync pass panicked");
            }
        }
    }
}
