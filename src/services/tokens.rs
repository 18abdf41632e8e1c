//! Address sets and ERC20 metadata for the tokens referenced by contracts.

use super::state::AuxiliaryAddress;
use super::Clock;
use crate::contracts::abi::{decode_return, encode, Erc20};
use crate::contracts::{CallBatcher, ContractCall};
use crate::error::{CallError, StoreError};
use crate::store::{AddressKind, AddressRecord, Erc20Record, Tables};
use alloy_primitives::{Address, Bytes};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

const TOKEN_CALLS_PER_ADDRESS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenReport {
    /// Addresses newly added to one of the address sets.
    pub recorded: usize,
    /// Tokens whose metadata was fetched and stored this pass.
    pub fetched: usize,
    pub failures: Vec<Address>,
}

pub struct TokenService {
    batcher: Arc<dyn CallBatcher>,
    tables: Tables,
    batch_size: usize,
    call_timeout: Duration,
    clock: Clock,
}

impl TokenService {
    pub fn new(
        batcher: Arc<dyn CallBatcher>,
        tables: Tables,
        batch_size: usize,
        call_timeout: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            batcher,
            tables,
            batch_size: batch_size.max(1),
            call_timeout,
            clock,
        }
    }

    /// Records every reference in its address set (first writer wins), then
    /// fetches metadata for every known token without an ERC20 row, including
    /// tokens only referenced by expired contracts.
    pub async fn sync(&self, references: &[AuxiliaryAddress]) -> TokenReport {
        let mut report = TokenReport::default();
        let mut tokens = BTreeSet::new();

        for reference in references {
            tokens.insert(reference.address);
            match self.record(reference).await {
                Ok(true) => report.recorded += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(address = %reference.address, error = %err, "failed to record token address");
                }
            }
        }

        for kind in AddressKind::ALL {
            match self.tables.address_set(kind).keys().await {
                Ok(known) => tokens.extend(known),
                Err(err) => {
                    tracing::warn!(?kind, error = %err, "failed to list token addresses");
                }
            }
        }

        let mut missing = Vec::new();
        for token in tokens {
            match self.tables.erc20s.has(&token).await {
                Ok(false) => missing.push(token),
                Ok(true) => {}
                Err(err) => {
                    tracing::warn!(token = %token, error = %err, "failed to read token metadata");
                    report.failures.push(token);
                }
            }
        }

        for chunk in missing.chunks(self.batch_size) {
            self.fetch_chunk(chunk, &mut report).await;
        }

        if !report.failures.is_empty() {
            tracing::warn!(failures = report.failures.len(), "token metadata incomplete");
        }
        report
    }

    async fn record(&self, reference: &AuxiliaryAddress) -> Result<bool, StoreError> {
        let table = self.tables.address_set(reference.kind);
        if table.has(&reference.address).await? {
            return Ok(false);
        }
        table
            .upsert(
                reference.address,
                AddressRecord {
                    address: reference.address,
                    kind: reference.kind,
                    first_seen_in: reference.referenced_by,
                },
            )
            .await?;
        Ok(true)
    }

    async fn fetch_chunk(&self, chunk: &[Address], report: &mut TokenReport) {
        let per_token = [
            encode(Erc20::symbolCall {}),
            encode(Erc20::nameCall {}),
            encode(Erc20::decimalsCall {}),
        ];
        let calls: Vec<ContractCall> = chunk
            .iter()
            .flat_map(|token| {
                per_token.iter().map(move |data| ContractCall {
                    target: *token,
                    data: data.clone(),
                })
            })
            .collect();

        let output = match timeout(self.call_timeout, self.batcher.execute(&calls)).await {
            Ok(Ok(output)) if output.results.len() == calls.len() => output,
            Ok(Ok(output)) => {
                tracing::warn!(
                    expected = calls.len(),
                    got = output.results.len(),
                    "token batch returned a mismatched result count"
                );
                report.failures.extend_from_slice(chunk);
                return;
            }
            Ok(Err(err)) => {
                tracing::warn!(tokens = chunk.len(), error = %err, "token batch failed");
                report.failures.extend_from_slice(chunk);
                return;
            }
            Err(_) => {
                tracing::warn!(tokens = chunk.len(), "token batch timed out");
                report.failures.extend_from_slice(chunk);
                return;
            }
        };

        for (idx, token) in chunk.iter().enumerate() {
            let results = &output.results[idx * TOKEN_CALLS_PER_ADDRESS..][..TOKEN_CALLS_PER_ADDRESS];
            let Some(record) = self.decode_token(*token, results) else {
                report.failures.push(*token);
                continue;
            };
            match self.tables.erc20s.upsert(*token, record).await {
                Ok(()) => report.fetched += 1,
                Err(err) => {
                    tracing::warn!(token = %token, error = %err, "failed to store token metadata");
                    report.failures.push(*token);
                }
            }
        }
    }

    /// `None` when no metadata field could be read.
    fn decode_token(&self, token: Address, results: &[Result<Bytes, CallError>]) -> Option<Erc20Record> {
        let symbol = results[0]
            .as_ref()
            .ok()
            .and_then(|data| decode_return::<Erc20::symbolCall>(token, "symbol", data).ok())
            .map(|decoded| decoded._0);
        let name = results[1]
            .as_ref()
            .ok()
            .and_then(|data| decode_return::<Erc20::nameCall>(token, "name", data).ok())
            .map(|decoded| decoded._0);
        let decimals = results[2]
            .as_ref()
            .ok()
            .and_then(|data| decode_return::<Erc20::decimalsCall>(token, "decimals", data).ok())
            .map(|decoded| decoded._0);

        if symbol.is_none() && name.is_none() && decimals.is_none() {
            return None;
        }
        Some(Erc20Record {
            address: token,
            symbol,
            name,
            decimals,
            updated_at: (self.clock)(),
        })
    }
}
