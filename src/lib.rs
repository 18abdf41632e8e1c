pub mod contracts;
pub mod error;
pub mod rpc;
pub mod runtime;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use contracts::{CallBatcher, Emp, Family, Lsp, MulticallBatcher, SequentialBatcher};
pub use error::{CallError, ConfigError, DiscoveryError, StoreError, SyncError};
pub use rpc::circuit_breaker::{CircuitBreakerSnapshot, CircuitState, RpcCircuitBreaker};
pub use rpc::{BasicAuth, ChainClient, EthRpcClient, RpcError};
pub use runtime::config::{ServiceConfig, ServiceConfigBuilder, ServiceConfigParams};
pub use runtime::runner::{Runner, RunningService};
pub use runtime::scheduler::{Scheduler, SchedulerState, SyncPass, TriggerOutcome};
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use services::{system_clock, Clock, ContractsOrchestrator, PassSummary, SyncSettings};
pub use store::{FamilyKind, Tables};
