//! Strategies for executing many independent contract reads.
//!
//! [`MulticallBatcher`] folds a batch into one Multicall2
//! `tryBlockAndAggregate(false, ...)` round trip. [`SequentialBatcher`] issues
//! one `eth_call` per read for nodes without a Multicall2 deployment.

use super::abi::{decode_return, Multicall2};
use crate::error::CallError;
use crate::rpc::{ChainClient, RpcError};
use alloy_primitives::{Address, Bytes};
use alloy_sol_types::SolCall;
use futures::future::BoxFuture;
use std::sync::Arc;

/// One read: calldata sent to `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub target: Address,
    pub data: Bytes,
}

/// Per-call outcomes in request order, plus the block they were read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOutput {
    pub block_number: u64,
    pub results: Vec<Result<Bytes, CallError>>,
}

pub trait CallBatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Executes `calls`. Individual failures are reported in
    /// [`BatchOutput::results`]; `Err` means the batching mechanism itself failed.
    fn execute<'a>(&'a self, calls: &'a [ContractCall]) -> BoxFuture<'a, Result<BatchOutput, CallError>>;
}

/// Maps a transport-level failure of a single read.
pub(crate) fn call_error(target: Address, err: &anyhow::Error) -> CallError {
    match err.downcast_ref::<RpcError>() {
        Some(RpcError::Reverted { .. }) => CallError::Reverted { target },
        Some(RpcError::Timeout { .. }) => CallError::Timeout,
        _ => CallError::Batch(format!("{err:#}")),
    }
}

pub struct MulticallBatcher {
    client: Arc<dyn ChainClient>,
    multicall: Address,
}

impl MulticallBatcher {
    pub fn new(client: Arc<dyn ChainClient>, multicall: Address) -> Self {
        Self { client, multicall }
    }

    pub fn address(&self) -> Address {
        self.multicall
    }

    async fn aggregate(&self, calls: &[ContractCall]) -> Result<BatchOutput, CallError> {
        if calls.is_empty() {
            return Ok(BatchOutput {
                block_number: 0,
                results: Vec::new(),
            });
        }

        let request = Multicall2::tryBlockAndAggregateCall {
            requireSuccess: false,
            calls: calls
                .iter()
                .map(|call| Multicall2::Call {
                    target: call.target,
                    callData: call.data.clone(),
                })
                .collect(),
        };

        let raw = self
            .client
            .call(self.multicall, Bytes::from(request.abi_encode()))
            .await
            .map_err(|err| match call_error(self.multicall, &err) {
                CallError::Timeout => CallError::Timeout,
                _ => CallError::Batch(format!("multicall {} failed: {err:#}", self.multicall)),
            })?;

        let decoded = decode_return::<Multicall2::tryBlockAndAggregateCall>(
            self.multicall,
            "tryBlockAndAggregate",
            &raw,
        )
        .map_err(|err| CallError::Batch(err.to_string()))?;

        if decoded.returnData.len() != calls.len() {
            return Err(CallError::Batch(format!(
                "multicall returned {} results for {} calls",
                decoded.returnData.len(),
                calls.len()
            )));
        }

        let results = calls
            .iter()
            .zip(decoded.returnData)
            .map(|(call, result)| {
                if result.success {
                    Ok(result.returnData)
                } else {
                    Err(CallError::Reverted {
                        target: call.target,
                    })
                }
            })
            .collect();

        Ok(BatchOutput {
            block_number: u64::try_from(decoded.blockNumber).unwrap_or(u64::MAX),
            results,
        })
    }
}

impl CallBatcher for MulticallBatcher {
    fn name(&self) -> &'static str {
        "multicall2"
    }

    fn execute<'a>(&'a self, calls: &'a [ContractCall]) -> BoxFuture<'a, Result<BatchOutput, CallError>> {
        Box::pin(self.aggregate(calls))
    }
}

pub struct SequentialBatcher {
    client: Arc<dyn ChainClient>,
}

impl SequentialBatcher {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    async fn call_each(&self, calls: &[ContractCall]) -> Result<BatchOutput, CallError> {
        let block_number = self
            .client
            .block_number()
            .await
            .map_err(|err| CallError::Batch(format!("eth_blockNumber failed: {err:#}")))?;

        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self
                .client
                .call(call.target, call.data.clone())
                .await
                .map_err(|err| call_error(call.target, &err));
            results.push(result);
        }

        Ok(BatchOutput {
            block_number,
            results,
        })
    }
}

impl CallBatcher for SequentialBatcher {
    fn name(&self) -> &'static str {
        "sequential"
    }

    fn execute<'a>(&'a self, calls: &'a [ContractCall]) -> BoxFuture<'a, Result<BatchOutput, CallError>> {
        Box::pin(self.call_each(calls))
    }
}
