//! HTTP trigger surface: `POST /scheduler` and `GET /health`.

use crate::runtime::scheduler::{Scheduler, TriggerOutcome};
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
    pub outcome: TriggerOutcome,
}

pub fn router(scheduler: Scheduler) -> Router {
    Router::new()
        .route("/scheduler", post(trigger))
        .route("/health", get(health))
        .with_state(scheduler)
}

/// Fire-and-forget: the pass runs in the background and its outcome is
/// only visible through the app stats table.
async fn trigger(State(scheduler): State<Scheduler>) -> (StatusCode, Json<TriggerResponse>) {
    let outcome = scheduler.trigger();
    tracing::info!(?outcome, "sync pass requested over http");
    (
        StatusCode::ACCEPTED,
        Json(TriggerResponse {
            accepted: true,
            outcome,
        }),
    )
}

async fn health() -> &'static str {
    "ok"
}

/// Serves the router on `listener` until `shutdown` is cancelled.
pub async fn serve(
    listener: TcpListener,
    scheduler: Scheduler,
    shutdown: CancellationToken,
) -> Result<()> {
    let local_addr = listener.local_addr().context("listener has no local address")?;
    tracing::info!(%local_addr, "http trigger endpoint listening");

    axum::serve(listener, router(scheduler))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("http server failed")
}
