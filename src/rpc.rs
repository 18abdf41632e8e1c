//! Ethereum JSON-RPC plumbing: authentication, circuit breaker, metrics,
//! retry policy, wire types, and the `ChainClient` abstraction.

pub mod auth;
pub mod circuit_breaker;
pub mod client;
pub mod metrics;
pub mod options;
pub mod retry;
pub mod types;

pub use auth::BasicAuth;
pub use circuit_breaker::{CircuitBreakerSnapshot, CircuitOpen, CircuitState, RpcCircuitBreaker};
pub use client::{ChainClient, EthRpcClient, RpcError};
pub use metrics::RpcMetricsSnapshot;
pub use options::RpcClientOptions;
pub use types::{ChainLog, LogFilter};
