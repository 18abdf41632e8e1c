use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use alloy_primitives::{Address, Bytes, FixedBytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use anyhow::{Context, Result};
use contract_sync::contracts::abi::{
    Erc20, ExpiringMultiParty, LongShortPair, LongShortPairCreator, Multicall2, Registry,
};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const CHAIN_ID: u64 = 1;
pub const MULTICALL: Address = Address::new([0xaa; 20]);
pub const REGISTRY: Address = Address::new([0xbb; 20]);
pub const CREATOR: Address = Address::new([0xcf; 20]);
pub const DEPLOYER: Address = Address::new([0xdd; 20]);
pub const COLLATERAL: Address = Address::new([0x71; 20]);
pub const SYNTHETIC: Address = Address::new([0x72; 20]);
pub const LONG: Address = Address::new([0x73; 20]);
pub const SHORT: Address = Address::new([0x74; 20]);

pub fn contract(id: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xc0;
    bytes[19] = id;
    Address::from(bytes)
}

#[derive(Clone, Copy)]
enum Kind {
    Emp,
    Lsp,
}

#[derive(Clone, Copy)]
struct Deployed {
    kind: Kind,
    expiration: u64,
    state: u8,
}

#[derive(Default)]
struct NodeState {
    head: u64,
    logs: Vec<Value>,
    contracts: HashMap<Address, Deployed>,
    tokens: HashMap<Address, (String, u8)>,
    failing: HashSet<Address>,
}

/// Ethereum node double serving the handful of JSON-RPC methods the service uses.
#[derive(Clone)]
pub struct MockNode {
    inner: Arc<RwLock<NodeState>>,
    eth_calls: Arc<AtomicU64>,
}

impl MockNode {
    pub fn new(head: u64) -> Self {
        let node = Self {
            inner: Arc::new(RwLock::new(NodeState {
                head,
                ..NodeState::default()
            })),
            eth_calls: Arc::new(AtomicU64::new(0)),
        };
        node.add_token(COLLATERAL, "WETH", 18);
        node.add_token(SYNTHETIC, "synUSD", 18);
        node.add_token(LONG, "LONG", 18);
        node.add_token(SHORT, "SHORT", 18);
        node
    }

    pub fn set_head(&self, head: u64) {
        self.inner.write().expect("mock node poisoned").head = head;
    }

    pub fn add_token(&self, address: Address, symbol: &str, decimals: u8) {
        self.inner
            .write()
            .expect("mock node poisoned")
            .tokens
            .insert(address, (symbol.to_owned(), decimals));
    }

    pub fn register_emp(&self, address: Address, block: u64, expiration: u64) {
        let event = Registry::NewContractRegistered {
            contractAddress: address,
            creator: DEPLOYER,
            parties: Vec::new(),
        };
        self.deploy(REGISTRY, address, block, Kind::Emp, expiration, event.encode_log_data());
    }

    pub fn create_lsp(&self, address: Address, block: u64, expiration: u64) {
        let event = LongShortPairCreator::CreatedLongShortPair {
            longShortPair: address,
            deployerAddress: DEPLOYER,
            longToken: LONG,
            shortToken: SHORT,
        };
        self.deploy(CREATOR, address, block, Kind::Lsp, expiration, event.encode_log_data());
    }

    fn deploy(
        &self,
        emitter: Address,
        address: Address,
        block: u64,
        kind: Kind,
        expiration: u64,
        log: alloy_primitives::LogData,
    ) {
        let mut inner = self.inner.write().expect("mock node poisoned");
        let index = inner.logs.len() as u64;
        inner.logs.push(json!({
            "address": emitter,
            "topics": log.topics(),
            "data": log.data,
            "blockNumber": format!("{block:#x}"),
            "logIndex": format!("{index:#x}"),
            "transactionHash": B256::with_last_byte(index as u8),
            "removed": false,
        }));
        inner.contracts.insert(
            address,
            Deployed {
                kind,
                expiration,
                state: 0,
            },
        );
    }

    pub fn set_contract_state(&self, address: Address, state: u8) {
        if let Some(deployed) = self
            .inner
            .write()
            .expect("mock node poisoned")
            .contracts
            .get_mut(&address)
        {
            deployed.state = state;
        }
    }

    pub fn fail_address(&self, address: Address) {
        self.inner.write().expect("mock node poisoned").failing.insert(address);
    }

    pub fn restore_address(&self, address: Address) {
        self.inner.write().expect("mock node poisoned").failing.remove(&address);
    }

    /// Number of `eth_call` requests served so far.
    pub fn eth_calls(&self) -> u64 {
        self.eth_calls.load(Ordering::SeqCst)
    }

    fn head(&self) -> u64 {
        self.inner.read().expect("mock node poisoned").head
    }

    fn logs(&self, filter: &Value) -> Vec<Value> {
        let address = filter.get("address").and_then(Value::as_str).unwrap_or_default();
        let from = quantity(filter.get("fromBlock"));
        let to = quantity(filter.get("toBlock"));
        let topic0 = filter
            .get("topics")
            .and_then(|topics| topics.get(0))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_ascii_lowercase();

        let inner = self.inner.read().expect("mock node poisoned");
        inner
            .logs
            .iter()
            .filter(|log| {
                let emitter = log["address"].as_str().unwrap_or_default();
                let block = quantity(log.get("blockNumber"));
                let topic = log["topics"][0].as_str().unwrap_or_default().to_ascii_lowercase();
                emitter.eq_ignore_ascii_case(address) && topic == topic0 && block >= from && block <= to
            })
            .cloned()
            .collect()
    }

    fn call(&self, to: Address, data: &[u8]) -> Option<Vec<u8>> {
        self.eth_calls.fetch_add(1, Ordering::SeqCst);
        if to == MULTICALL {
            return self.multicall(data);
        }
        self.answer(to, data)
    }

    fn multicall(&self, data: &[u8]) -> Option<Vec<u8>> {
        let request = Multicall2::tryBlockAndAggregateCall::abi_decode(data, true).ok()?;
        let results: Vec<Multicall2::CallResult> = request
            .calls
            .iter()
            .map(|call| match self.answer(call.target, &call.callData) {
                Some(output) => Multicall2::CallResult {
                    success: true,
                    returnData: output.into(),
                },
                None => Multicall2::CallResult {
                    success: false,
                    returnData: Bytes::new(),
                },
            })
            .collect();
        Some(Multicall2::tryBlockAndAggregateCall::abi_encode_returns(&(
            U256::from(self.head()),
            B256::ZERO,
            results,
        )))
    }

    fn answer(&self, target: Address, data: &[u8]) -> Option<Vec<u8>> {
        let inner = self.inner.read().expect("mock node poisoned");
        if inner.failing.contains(&target) || data.len() < 4 {
            return None;
        }
        let selector: [u8; 4] = data[..4].try_into().ok()?;

        if let Some((symbol, decimals)) = inner.tokens.get(&target) {
            return match selector {
                s if s == Erc20::symbolCall::SELECTOR => Some((symbol.clone(),).abi_encode_params()),
                s if s == Erc20::nameCall::SELECTOR => Some((format!("{symbol} Token"),).abi_encode_params()),
                s if s == Erc20::decimalsCall::SELECTOR => Some(U256::from(*decimals).abi_encode()),
                _ => None,
            };
        }

        let deployed = *inner.contracts.get(&target)?;
        let word = |value: u64| Some(U256::from(value).abi_encode());
        match deployed.kind {
            Kind::Emp => match selector {
                s if s == ExpiringMultiParty::expirationTimestampCall::SELECTOR => word(deployed.expiration),
                s if s == ExpiringMultiParty::contractStateCall::SELECTOR => word(deployed.state.into()),
                s if s == ExpiringMultiParty::collateralCurrencyCall::SELECTOR => Some(COLLATERAL.abi_encode()),
                s if s == ExpiringMultiParty::tokenCurrencyCall::SELECTOR => Some(SYNTHETIC.abi_encode()),
                s if s == ExpiringMultiParty::priceIdentifierCall::SELECTOR => Some(identifier("ETH/USD")),
                s if s == ExpiringMultiParty::totalPositionCollateralCall::SELECTOR => word(1_000),
                s if s == ExpiringMultiParty::totalTokensOutstandingCall::SELECTOR => word(500),
                s if s == ExpiringMultiParty::collateralRequirementCall::SELECTOR => word(1_250_000_000_000_000_000),
                s if s == ExpiringMultiParty::minSponsorTokensCall::SELECTOR => word(100),
                _ => None,
            },
            Kind::Lsp => match selector {
                s if s == LongShortPair::expirationTimestampCall::SELECTOR => word(deployed.expiration),
                s if s == LongShortPair::contractStateCall::SELECTOR => word(deployed.state.into()),
                s if s == LongShortPair::collateralTokenCall::SELECTOR => Some(COLLATERAL.abi_encode()),
                s if s == LongShortPair::longTokenCall::SELECTOR => Some(LONG.abi_encode()),
                s if s == LongShortPair::shortTokenCall::SELECTOR => Some(SHORT.abi_encode()),
                s if s == LongShortPair::collateralPerPairCall::SELECTOR => word(1_000_000_000_000_000_000),
                s if s == LongShortPair::priceIdentifierCall::SELECTOR => Some(identifier("UMAUSD")),
                s if s == LongShortPair::pairNameCall::SELECTOR => {
                    Some(("UMA Pair".to_owned(),).abi_encode_params())
                }
                _ => None,
            },
        }
    }
}

fn identifier(text: &str) -> Vec<u8> {
    let mut raw = [0u8; 32];
    raw[..text.len()].copy_from_slice(text.as_bytes());
    FixedBytes::<32>::from(raw).abi_encode()
}

fn quantity(value: Option<&Value>) -> u64 {
    value
        .and_then(Value::as_str)
        .and_then(|raw| u64::from_str_radix(raw.trim_start_matches("0x"), 16).ok())
        .unwrap_or(0)
}

pub struct MockNodeServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockNodeServer {
    pub async fn start(node: MockNode) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock node listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let node = node.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(node.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock node stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(node: MockNode, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        let mut response = Response::new(Body::from("Unsupported method"));
        *response.status_mut() = StatusCode::METHOD_NOT_ALLOWED;
        return Ok(response);
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("failed to read body: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            let mut response = Response::new(Body::from(format!("invalid JSON payload: {err}")));
            *response.status_mut() = StatusCode::BAD_REQUEST;
            return Ok(response);
        }
    };

    let response_value = match payload {
        Value::Array(calls) => Value::Array(calls.into_iter().map(|call| handle_call(&node, call)).collect()),
        call => handle_call(&node, call),
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn handle_call(node: &MockNode, call: Value) -> Value {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let params = call
        .get("params")
        .cloned()
        .unwrap_or_else(|| Value::Array(Vec::new()));
    let first = params.get(0).cloned().unwrap_or(Value::Null);

    match method.as_str() {
        "eth_chainId" => success(id, json!(format!("{CHAIN_ID:#x}"))),
        "eth_blockNumber" => success(id, json!(format!("{:#x}", node.head()))),
        "eth_getLogs" => success(id, Value::Array(node.logs(&first))),
        "eth_call" => {
            let to = first
                .get("to")
                .cloned()
                .and_then(|value| serde_json::from_value::<Address>(value).ok());
            let data = first
                .get("data")
                .cloned()
                .and_then(|value| serde_json::from_value::<Bytes>(value).ok());
            match (to, data) {
                (Some(to), Some(data)) => match node.call(to, &data) {
                    Some(output) => success(id, json!(Bytes::from(output))),
                    None => error(id, 3, "execution reverted"),
                },
                _ => error(id, -32602, "invalid eth_call params"),
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    }
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
