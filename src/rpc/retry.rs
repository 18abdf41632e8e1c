//! Retry context and canned log messages shared by every `EthRpcClient`
//! operation, so breaker and retry instrumentation reads the same everywhere.

use crate::rpc::circuit_breaker::CircuitState;
use alloy_primitives::Address;
use anyhow::Error;
use std::time::Duration;

macro_rules! log_with_retry_ctx {
    ($level:ident, $ctx:expr, $($rest:tt)*) => {{
        if let Some(target) = $ctx.target {
            tracing::$level!(
                method = $ctx.messages.method,
                target = %target,
                $($rest)*
            );
        } else {
            tracing::$level!(method = $ctx.messages.method, $($rest)*);
        }
    }};
}

/// Log labels and retry behaviour of one JSON-RPC method.
#[derive(Clone, Copy)]
pub(crate) struct RetryMessages {
    pub(crate) method: &'static str,
    pub(crate) circuit_open: &'static str,
    pub(crate) timeout: &'static str,
    pub(crate) retry: &'static str,
    pub(crate) exhausted: &'static str,
    pub(crate) oversized: &'static str,
    /// `eth_call` timeouts are final for the pass; chain metadata reads retry.
    pub(crate) retry_after_timeout: bool,
}

#[derive(Clone, Copy)]
pub(crate) struct RetryContext<'a> {
    target: Option<Address>,
    messages: &'a RetryMessages,
}

impl<'a> RetryContext<'a> {
    pub(crate) fn new(messages: &'a RetryMessages) -> Self {
        Self {
            target: None,
            messages,
        }
    }

    pub(crate) fn with_target(messages: &'a RetryMessages, target: Address) -> Self {
        Self {
            target: Some(target),
            messages,
        }
    }

    pub(crate) fn method(&self) -> &'static str {
        self.messages.method
    }

    pub(crate) fn retry_after_timeout(&self) -> bool {
        self.messages.retry_after_timeout
    }

    pub(crate) fn log_permit(&self, state: CircuitState) {
        log_with_retry_ctx!(trace, self, breaker_state = ?state, "circuit breaker permit acquired");
    }

    pub(crate) fn log_circuit_open(&self) {
        log_with_retry_ctx!(warn, self, "{}", self.messages.circuit_open);
    }

    pub(crate) fn log_timeout(&self, attempt: usize, will_retry: bool) {
        log_with_retry_ctx!(warn, self, attempt, will_retry, "{}", self.messages.timeout);
    }

    pub(crate) fn log_retry(&self, attempt: usize, backoff: Duration, err: &Error) {
        let backoff_ms = backoff.as_millis().min(u128::from(u64::MAX)) as u64;
        log_with_retry_ctx!(
            warn,
            self,
            attempt,
            backoff_ms,
            error = %err,
            "{}",
            self.messages.retry
        );
    }

    pub(crate) fn log_exhausted(&self, attempt: usize, err: &Error) {
        log_with_retry_ctx!(error, self, attempt, error = %err, "{}", self.messages.exhausted);
    }

    pub(crate) fn log_reverted(&self, attempt: usize) {
        log_with_retry_ctx!(debug, self, attempt, "eth_call reverted");
    }

    pub(crate) fn log_oversized(&self, attempt: usize) {
        log_with_retry_ctx!(warn, self, attempt, "{}", self.messages.oversized);
    }
}

pub(crate) const CHAIN_ID_RETRY: RetryMessages = RetryMessages {
    method: "eth_chainId",
    circuit_open: "RPC circuit breaker open; rejecting eth_chainId",
    timeout: "eth_chainId timed out",
    retry: "eth_chainId failed; retrying",
    exhausted: "eth_chainId exhausted retries",
    oversized: "eth_chainId response exceeded HTTP size limit",
    retry_after_timeout: true,
};

pub(crate) const BLOCK_NUMBER_RETRY: RetryMessages = RetryMessages {
    method: "eth_blockNumber",
    circuit_open: "RPC circuit breaker open; rejecting eth_blockNumber",
    timeout: "eth_blockNumber timed out",
    retry: "eth_blockNumber failed; retrying",
    exhausted: "eth_blockNumber exhausted retries",
    oversized: "eth_blockNumber response exceeded HTTP size limit",
    retry_after_timeout: true,
};

pub(crate) const GET_LOGS_RETRY: RetryMessages = RetryMessages {
    method: "eth_getLogs",
    circuit_open: "RPC circuit breaker open; rejecting eth_getLogs",
    timeout: "eth_getLogs timed out",
    retry: "eth_getLogs failed; retrying",
    exhausted: "eth_getLogs exhausted retries",
    oversized: "eth_getLogs response exceeded HTTP size limit; narrow the log block range",
    retry_after_timeout: true,
};

pub(crate) const ETH_CALL_RETRY: RetryMessages = RetryMessages {
    method: "eth_call",
    circuit_open: "RPC circuit breaker open; rejecting eth_call",
    timeout: "eth_call timed out",
    retry: "eth_call failed; retrying",
    exhausted: "eth_call exhausted retries",
    oversized: "eth_call response exceeded HTTP size limit; lower the batch size",
    retry_after_timeout: false,
};
