//! Read-only Ethereum access. Houses the `ChainClient` trait consumed by the
//! discovery services and the call batchers, plus `EthRpcClient`, its
//! JSON-RPC implementation with retries, a circuit breaker, and metrics.

use crate::rpc::auth::{build_auth_headers, BasicAuth};
use crate::rpc::circuit_breaker::RpcCircuitBreaker;
use crate::rpc::metrics::{RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::rpc::retry::{
    RetryContext, BLOCK_NUMBER_RETRY, CHAIN_ID_RETRY, ETH_CALL_RETRY, GET_LOGS_RETRY,
};
use crate::rpc::types::{quantity, ChainLog, LogFilter};
use crate::runtime::config::ServiceConfig;
use alloy_primitives::{Address, Bytes};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{
    client::{ClientT, Error as JsonRpcError},
    http_helpers::HttpError,
    params::ArrayParams,
};
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::{future::Future, sync::Arc};
use tokio::time::{sleep, timeout, Instant};

/// JSON-RPC error code geth uses for `execution reverted`.
const REVERT_ERROR_CODE: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("rpc method {method} timed out")]
    Timeout { method: &'static str },
    #[error("rpc circuit breaker is open")]
    CircuitOpen,
    #[error("rpc {method} response exceeded HTTP size limits")]
    ResponseTooLarge { method: &'static str },
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
}

/// Read-only chain access shared by every service of a pass.
pub trait ChainClient: Send + Sync {
    fn network_id(&self) -> BoxFuture<'_, Result<u64>>;

    fn block_number(&self) -> BoxFuture<'_, Result<u64>>;

    fn get_logs<'a>(&'a self, filter: &'a LogFilter) -> BoxFuture<'a, Result<Vec<ChainLog>>>;

    /// `eth_call` against the latest block. Reverts surface as [`RpcError::Reverted`].
    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>>;
}

#[derive(Debug, Clone)]
pub struct EthRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
    breaker: Arc<RpcCircuitBreaker>,
}

impl ChainClient for EthRpcClient {
    fn network_id(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.chain_id())
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(self.latest_block_number())
    }

    fn get_logs<'a>(&'a self, filter: &'a LogFilter) -> BoxFuture<'a, Result<Vec<ChainLog>>> {
        Box::pin(self.logs(filter))
    }

    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move { self.eth_call(to, &data).await })
    }
}

impl EthRpcClient {
    pub fn new(url: impl Into<String>, auth: Option<BasicAuth>) -> Result<Self> {
        Self::with_options(url, auth, RpcClientOptions::default())
    }

    pub fn with_options(
        url: impl Into<String>,
        auth: Option<BasicAuth>,
        options: RpcClientOptions,
    ) -> Result<Self> {
        let breaker = Arc::new(RpcCircuitBreaker::new(
            options.breaker_failure_threshold,
            options.breaker_cooldown,
        ));
        Self::with_options_and_breaker(url, auth, options, breaker)
    }

    pub fn with_options_and_breaker(
        url: impl Into<String>,
        auth: Option<BasicAuth>,
        options: RpcClientOptions,
        breaker: Arc<RpcCircuitBreaker>,
    ) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let headers = build_auth_headers(auth.as_ref())?;
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .set_headers(headers)
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
            breaker,
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        let options = RpcClientOptions {
            request_timeout: config.rpc_timeout(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), config.rpc_auth().cloned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    pub fn metrics(&self) -> RpcMetricsSnapshot {
        self.metrics.snapshot(self.breaker.snapshot().state)
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let raw: String = self
            .retry_with_breaker(
                RetryContext::new(&CHAIN_ID_RETRY),
                || self.request_once(CHAIN_ID_RETRY.method, rpc_params![]),
                |attempt, _| tracing::debug!(attempt, "fetched chain id"),
            )
            .await?;
        quantity::decode(&raw).map_err(|err| anyhow!("eth_chainId returned {err}"))
    }

    pub async fn latest_block_number(&self) -> Result<u64> {
        let raw: String = self
            .retry_with_breaker(
                RetryContext::new(&BLOCK_NUMBER_RETRY),
                || self.request_once(BLOCK_NUMBER_RETRY.method, rpc_params![]),
                |attempt, head: &String| tracing::trace!(attempt, head = %head, "fetched chain head"),
            )
            .await?;
        quantity::decode(&raw).map_err(|err| anyhow!("eth_blockNumber returned {err}"))
    }

    pub async fn logs(&self, filter: &LogFilter) -> Result<Vec<ChainLog>> {
        self.retry_with_breaker(
            RetryContext::with_target(&GET_LOGS_RETRY, filter.address),
            || self.request_once(GET_LOGS_RETRY.method, rpc_params![filter]),
            |attempt, logs: &Vec<ChainLog>| {
                tracing::debug!(
                    attempt,
                    from_block = filter.from_block,
                    to_block = filter.to_block,
                    count = logs.len(),
                    "eth_getLogs completed"
                );
            },
        )
        .await
    }

    pub async fn eth_call(&self, to: Address, data: &Bytes) -> Result<Bytes> {
        self.retry_with_breaker(
            RetryContext::with_target(&ETH_CALL_RETRY, to),
            || {
                self.request_once(
                    ETH_CALL_RETRY.method,
                    rpc_params![json!({ "to": to, "data": data }), "latest"],
                )
            },
            |attempt, output: &Bytes| {
                tracing::trace!(attempt, bytes = output.len(), "eth_call completed");
            },
        )
        .await
    }

    async fn request_once<R>(&self, method: &'static str, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await
        .map_err(|_| RpcError::Timeout { method })?
        .map_err(|err| map_rpc_error(method, err))
    }

    /// Shared retry/backoff loop that wraps RPC operations with breaker gating,
    /// metrics, exponential backoff, and consistent logging.
    async fn retry_with_breaker<T, F, Fut, S>(
        &self,
        context: RetryContext<'_>,
        mut operation: F,
        mut on_success: S,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        S: FnMut(usize, &T),
    {
        let mut attempt = 0;

        loop {
            match self.breaker.permit() {
                Ok(state) => context.log_permit(state),
                Err(_) => {
                    context.log_circuit_open();
                    return Err(RpcError::CircuitOpen.into());
                }
            }

            attempt += 1;
            let start = Instant::now();

            match operation().await {
                Ok(value) => {
                    self.metrics.record_success(start.elapsed());
                    self.breaker.record_success();
                    on_success(attempt, &value);
                    return Ok(value);
                }
                Err(err) => {
                    let elapsed = start.elapsed();
                    match err.downcast_ref::<RpcError>() {
                        Some(RpcError::Reverted { .. }) => {
                            self.metrics.record_revert(elapsed);
                            self.breaker.record_success();
                            context.log_reverted(attempt);
                            return Err(err);
                        }
                        Some(RpcError::Timeout { .. }) => {
                            self.metrics.record_timeout(elapsed);
                            self.breaker.record_failure();
                            let will_retry = context.retry_after_timeout()
                                && attempt < self.options.max_attempts;
                            context.log_timeout(attempt, will_retry);
                            if !will_retry {
                                context.log_exhausted(attempt, &err);
                                return Err(err);
                            }
                            let backoff = self.options.backoff_delay(attempt);
                            context.log_retry(attempt, backoff, &err);
                            sleep(backoff).await;
                            continue;
                        }
                        Some(RpcError::ResponseTooLarge { .. }) => {
                            self.metrics.record_failure(elapsed);
                            self.breaker.record_failure();
                            context.log_oversized(attempt);
                            return Err(err);
                        }
                        _ => {}
                    }

                    self.metrics.record_failure(elapsed);
                    self.breaker.record_failure();

                    if attempt >= self.options.max_attempts {
                        context.log_exhausted(attempt, &err);
                        return Err(err);
                    }

                    let backoff = self.options.backoff_delay(attempt);
                    context.log_retry(attempt, backoff, &err);
                    sleep(backoff).await;
                }
            }
        }
    }
}

fn map_rpc_error(method: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method }.into();
    }
    if let JsonRpcError::Call(object) = &err {
        if object.code() == REVERT_ERROR_CODE || object.message().contains("revert") {
            return RpcError::Reverted {
                reason: object.message().to_owned(),
            }
            .into();
        }
        return anyhow!(
            "rpc {method} call failed (code={}, message={})",
            object.code(),
            object.message()
        );
    }
    anyhow!("rpc {method} call failed: {err} ({})", method_context(method))
}

fn method_context(method: &str) -> &'static str {
    match method {
        "eth_call" => "contract read",
        "eth_getLogs" => "log scan",
        _ => "chain metadata",
    }
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
