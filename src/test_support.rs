//! In-process chain double for unit tests.
//!
//! [`FakeChain`] answers `eth_getLogs` from recorded discovery events and
//! `eth_call` from a table of deployed contracts and tokens, including
//! Multicall2 `tryBlockAndAggregate` batches.

use crate::contracts::abi::{
    Erc20, ExpiringMultiParty, LongShortPair, LongShortPairCreator, Multicall2, Registry,
};
use crate::rpc::{ChainClient, ChainLog, LogFilter, RpcError};
use crate::services::Clock;
use crate::error::StoreError;
use crate::store::{FamilyKind, MemoryTable, RowFilter, StoreResult, Table, TableKey, TableValue};
use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use anyhow::{anyhow, Result};
use chrono::{TimeZone, Utc};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) fn fixed_clock(secs: i64) -> Clock {
    Arc::new(move || Utc.timestamp_opt(secs, 0).unwrap())
}

/// Memory table whose `fail_on`-th write call (1-based) fails.
pub(crate) struct FailingTable<K, V> {
    rows: MemoryTable<K, V>,
    fail_on: usize,
    writes: AtomicUsize,
}

impl<K: TableKey, V: TableValue> FailingTable<K, V> {
    pub(crate) fn new(name: &str, fail_on: usize) -> Self {
        Self {
            rows: MemoryTable::new(name),
            fail_on,
            writes: AtomicUsize::new(0),
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.writes.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Unavailable {
                table: self.rows.name().to_owned(),
                reason: "injected write failure".into(),
            });
        }
        Ok(())
    }
}

impl<K: TableKey, V: TableValue> Table<K, V> for FailingTable<K, V> {
    fn name(&self) -> &str {
        self.rows.name()
    }

    fn upsert<'a>(&'a self, key: K, value: V) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check_write()?;
            self.rows.upsert(key, value).await
        })
    }

    fn upsert_many<'a>(&'a self, rows: Vec<(K, V)>) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.check_write()?;
            self.rows.upsert_many(rows).await
        })
    }

    fn get<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<Option<V>>> {
        self.rows.get(key)
    }

    fn has<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        self.rows.has(key)
    }

    fn delete<'a>(&'a self, key: &'a K) -> BoxFuture<'a, StoreResult<bool>> {
        self.rows.delete(key)
    }

    fn query<'a>(&'a self, filter: RowFilter<'a, K, V>) -> BoxFuture<'a, StoreResult<Vec<(K, V)>>> {
        self.rows.query(filter)
    }

    fn keys(&self) -> BoxFuture<'_, StoreResult<Vec<K>>> {
        self.rows.keys()
    }
}

/// On-chain state of a deployed EMP or LSP.
#[derive(Debug, Clone)]
pub(crate) struct ContractSpec {
    pub(crate) expiration: u64,
    pub(crate) state: u8,
    pub(crate) collateral: Address,
    /// EMP: `[synthetic]`. LSP: `[long, short]`.
    pub(crate) tokens: Vec<Address>,
}

#[derive(Debug, Clone)]
struct Deployed {
    family: FamilyKind,
    spec: ContractSpec,
}

#[derive(Debug, Clone)]
struct Token {
    symbol: String,
    decimals: u8,
}

#[derive(Default)]
struct ChainState {
    head: u64,
    logs: Vec<ChainLog>,
    contracts: HashMap<Address, Deployed>,
    tokens: HashMap<Address, Token>,
    failing: HashSet<Address>,
    failing_logs: HashSet<Address>,
    multicall_failing: bool,
    multicall_delay: Option<Duration>,
    multicall_sizes: Vec<usize>,
}

pub(crate) struct FakeChain {
    state: Mutex<ChainState>,
    get_logs_calls: AtomicUsize,
}

impl FakeChain {
    pub(crate) const MULTICALL: Address = Address::new([0xaa; 20]);
    pub(crate) const REGISTRY: Address = Address::new([0xbb; 20]);
    pub(crate) const DEPLOYER: Address = Address::new([0xdd; 20]);

    pub(crate) fn new(head: u64) -> Self {
        Self {
            state: Mutex::new(ChainState {
                head,
                ..ChainState::default()
            }),
            get_logs_calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn contract(id: u8) -> Address {
        tagged(0xc0, id)
    }

    pub(crate) fn token(id: u8) -> Address {
        tagged(0x70, id)
    }

    pub(crate) fn creator(id: u8) -> Address {
        tagged(0xcf, id)
    }

    pub(crate) fn symbol_calldata() -> Bytes {
        Bytes::from(Erc20::symbolCall {}.abi_encode())
    }

    /// Open EMP backed by `token(1)` with synthetic `token(2)`.
    pub(crate) fn open_emp(expiration: u64) -> ContractSpec {
        ContractSpec {
            expiration,
            state: 0,
            collateral: Self::token(1),
            tokens: vec![Self::token(2)],
        }
    }

    /// Open LSP backed by `token(1)` with long `token(3)` and short `token(4)`.
    pub(crate) fn open_lsp(expiration: u64) -> ContractSpec {
        ContractSpec {
            expiration,
            state: 0,
            collateral: Self::token(1),
            tokens: vec![Self::token(3), Self::token(4)],
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("fake chain state poisoned")
    }

    pub(crate) fn set_head(&self, head: u64) {
        self.state().head = head;
    }

    /// Deploys an EMP and emits its `NewContractRegistered` from the registry.
    pub(crate) fn register_emp(&self, address: Address, block: u64, spec: ContractSpec) {
        let event = Registry::NewContractRegistered {
            contractAddress: address,
            creator: Self::DEPLOYER,
            parties: Vec::new(),
        };
        self.deploy(Self::REGISTRY, address, block, FamilyKind::Emp, spec, event.encode_log_data());
    }

    /// Deploys an LSP and emits its `CreatedLongShortPair` from `creator`.
    pub(crate) fn create_lsp(&self, creator: Address, address: Address, block: u64, spec: ContractSpec) {
        let event = LongShortPairCreator::CreatedLongShortPair {
            longShortPair: address,
            deployerAddress: Self::DEPLOYER,
            longToken: spec.tokens[0],
            shortToken: spec.tokens[1],
        };
        self.deploy(creator, address, block, FamilyKind::Lsp, spec, event.encode_log_data());
    }

    fn deploy(
        &self,
        emitter: Address,
        address: Address,
        block: u64,
        family: FamilyKind,
        spec: ContractSpec,
        data: alloy_primitives::LogData,
    ) {
        let mut state = self.state();
        let log_index = state.logs.len() as u64;
        state.logs.push(ChainLog {
            address: emitter,
            topics: data.topics().to_vec(),
            data: data.data,
            block_number: block,
            log_index: Some(log_index),
            transaction_hash: Some(B256::with_last_byte(log_index as u8)),
            removed: false,
        });
        state.contracts.insert(address, Deployed { family, spec });
    }

    pub(crate) fn add_token(&self, address: Address, symbol: &str, decimals: u8) {
        self.state().tokens.insert(
            address,
            Token {
                symbol: symbol.to_owned(),
                decimals,
            },
        );
    }

    /// Every read of `address` reverts from now on.
    pub(crate) fn fail_address(&self, address: Address) {
        self.state().failing.insert(address);
    }

    pub(crate) fn restore_address(&self, address: Address) {
        self.state().failing.remove(&address);
    }

    pub(crate) fn fail_logs_from(&self, address: Address, fail: bool) {
        let mut state = self.state();
        if fail {
            state.failing_logs.insert(address);
        } else {
            state.failing_logs.remove(&address);
        }
    }

    pub(crate) fn fail_multicall(&self, fail: bool) {
        self.state().multicall_failing = fail;
    }

    pub(crate) fn set_multicall_delay(&self, delay: Option<Duration>) {
        self.state().multicall_delay = delay;
    }

    pub(crate) fn set_contract_state(&self, address: Address, raw: u8) {
        if let Some(deployed) = self.state().contracts.get_mut(&address) {
            deployed.spec.state = raw;
        }
    }

    pub(crate) fn multicall_count(&self) -> usize {
        self.state().multicall_sizes.len()
    }

    /// Number of inner calls of each multicall, in order.
    pub(crate) fn multicall_sizes(&self) -> Vec<usize> {
        self.state().multicall_sizes.clone()
    }

    pub(crate) fn get_logs_count(&self) -> usize {
        self.get_logs_calls.load(Ordering::SeqCst)
    }

    fn answer(state: &ChainState, target: Address, data: &[u8]) -> Option<Vec<u8>> {
        if state.failing.contains(&target) || data.len() < 4 {
            return None;
        }
        let selector: [u8; 4] = data[..4].try_into().ok()?;

        if let Some(token) = state.tokens.get(&target) {
            return answer_token(token, selector);
        }
        let deployed = state.contracts.get(&target)?;
        match deployed.family {
            FamilyKind::Emp => answer_emp(&deployed.spec, selector),
            FamilyKind::Lsp => answer_lsp(&deployed.spec, selector),
        }
    }

    async fn multicall(&self, data: Bytes) -> Result<Bytes> {
        let request = Multicall2::tryBlockAndAggregateCall::abi_decode(&data, true)?;
        let (delay, failing) = {
            let mut state = self.state();
            state.multicall_sizes.push(request.calls.len());
            (state.multicall_delay, state.multicall_failing)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if failing {
            return Err(anyhow!("multicall backend unavailable"));
        }

        let state = self.state();
        let results: Vec<Multicall2::CallResult> = request
            .calls
            .iter()
            .map(|call| match Self::answer(&state, call.target, &call.callData) {
                Some(data) => Multicall2::CallResult {
                    success: true,
                    returnData: data.into(),
                },
                None => Multicall2::CallResult {
                    success: false,
                    returnData: Bytes::new(),
                },
            })
            .collect();

        let encoded = Multicall2::tryBlockAndAggregateCall::abi_encode_returns(&(
            U256::from(state.head),
            B256::ZERO,
            results,
        ));
        Ok(encoded.into())
    }
}

impl ChainClient for FakeChain {
    fn network_id(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async { Ok(1) })
    }

    fn block_number(&self) -> BoxFuture<'_, Result<u64>> {
        Box::pin(async move { Ok(self.state().head) })
    }

    fn get_logs<'a>(&'a self, filter: &'a LogFilter) -> BoxFuture<'a, Result<Vec<ChainLog>>> {
        Box::pin(async move {
            self.get_logs_calls.fetch_add(1, Ordering::SeqCst);
            let state = self.state();
            if state.failing_logs.contains(&filter.address) {
                return Err(anyhow!("eth_getLogs failed for {}", filter.address));
            }
            Ok(state
                .logs
                .iter()
                .filter(|log| {
                    log.address == filter.address
                        && log.topics.first() == Some(&filter.topic0)
                        && (filter.from_block..=filter.to_block).contains(&log.block_number)
                })
                .cloned()
                .collect())
        })
    }

    fn call(&self, to: Address, data: Bytes) -> BoxFuture<'_, Result<Bytes>> {
        Box::pin(async move {
            if to == Self::MULTICALL {
                return self.multicall(data).await;
            }
            let state = self.state();
            Self::answer(&state, to, &data)
                .map(Bytes::from)
                .ok_or_else(|| {
                    RpcError::Reverted {
                        reason: format!("call to {to} reverted"),
                    }
                    .into()
                })
        })
    }
}

fn tagged(tag: u8, id: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = tag;
    bytes[19] = id;
    Address::from(bytes)
}

fn identifier(text: &str) -> FixedBytes<32> {
    let mut raw = [0u8; 32];
    raw[..text.len()].copy_from_slice(text.as_bytes());
    FixedBytes::from(raw)
}

fn string_return(value: &str) -> Vec<u8> {
    (value.to_owned(),).abi_encode_params()
}

fn answer_token(token: &Token, selector: [u8; 4]) -> Option<Vec<u8>> {
    if selector == Erc20::symbolCall::SELECTOR {
        Some(string_return(&token.symbol))
    } else if selector == Erc20::nameCall::SELECTOR {
        Some(string_return(&format!("{} Token", token.symbol)))
    } else if selector == Erc20::decimalsCall::SELECTOR {
        Some(U256::from(token.decimals).abi_encode())
    } else {
        None
    }
}

fn answer_emp(spec: &ContractSpec, selector: [u8; 4]) -> Option<Vec<u8>> {
    use ExpiringMultiParty as Emp;

    let encoded = if selector == Emp::expirationTimestampCall::SELECTOR {
        U256::from(spec.expiration).abi_encode()
    } else if selector == Emp::contractStateCall::SELECTOR {
        U256::from(spec.state).abi_encode()
    } else if selector == Emp::collateralCurrencyCall::SELECTOR {
        spec.collateral.abi_encode()
    } else if selector == Emp::tokenCurrencyCall::SELECTOR {
        spec.tokens.first()?.abi_encode()
    } else if selector == Emp::priceIdentifierCall::SELECTOR {
        identifier("ETH/USD").abi_encode()
    } else if selector == Emp::totalPositionCollateralCall::SELECTOR {
        U256::from(1_000u64).abi_encode()
    } else if selector == Emp::totalTokensOutstandingCall::SELECTOR {
        U256::from(500u64).abi_encode()
    } else if selector == Emp::collateralRequirementCall::SELECTOR {
        U256::from(1_250_000_000_000_000_000u128).abi_encode()
    } else if selector == Emp::minSponsorTokensCall::SELECTOR {
        U256::from(100u64).abi_encode()
    } else {
        return None;
    };
    Some(encoded)
}

fn answer_lsp(spec: &ContractSpec, selector: [u8; 4]) -> Option<Vec<u8>> {
    use LongShortPair as Lsp;

    let encoded = if selector == Lsp::expirationTimestampCall::SELECTOR {
        U256::from(spec.expiration).abi_encode()
    } else if selector == Lsp::contractStateCall::SELECTOR {
        U256::from(spec.state).abi_encode()
    } else if selector == Lsp::collateralTokenCall::SELECTOR {
        spec.collateral.abi_encode()
    } else if selector == Lsp::longTokenCall::SELECTOR {
        spec.tokens.first()?.abi_encode()
    } else if selector == Lsp::shortTokenCall::SELECTOR {
        spec.tokens.get(1)?.abi_encode()
    } else if selector == Lsp::collateralPerPairCall::SELECTOR {
        U256::from(1_000_000_000_000_000_000u128).abi_encode()
    } else if selector == Lsp::priceIdentifierCall::SELECTOR {
        identifier("UMAUSD").abi_encode()
    } else if selector == Lsp::pairNameCall::SELECTOR {
        string_return("UMA Pair")
    } else {
        return None;
    };
    Some(encoded)
}
