use crate::error::ConfigError;
use crate::rpc::BasicAuth;
use crate::services::discovery::{ScanSettings, DEFAULT_LOG_BLOCK_RANGE};
use crate::services::orchestrator::{
    SyncSettings, DEFAULT_DETECT_BATCH_SIZE, DEFAULT_UPDATE_BATCH_SIZE,
};
use crate::services::state::DEFAULT_CALL_TIMEOUT;
use crate::runtime::telemetry;
use alloy_primitives::Address;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 60;

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Runtime configuration for the synchronization service.
///
/// All instances must be constructed via [`ServiceConfig::builder`],
/// [`ServiceConfig::new`], or [`ServiceConfig::from_env`] so invariants are
/// validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    rpc_url: String,
    rpc_auth: Option<BasicAuth>,
    registry_address: Address,
    creator_addresses: Vec<Address>,
    multicall_address: Option<Address>,
    network_id: Option<u64>,
    detect_batch_size: usize,
    update_batch_size: usize,
    debug: bool,
    http_port: u16,
    scheduler_interval: Duration,
    rpc_timeout: Duration,
    call_timeout: Duration,
    log_block_range: u64,
    registry_start_block: u64,
    creator_start_block: u64,
    data_dir: Option<PathBuf>,
    metrics_interval: Duration,
}

pub struct ServiceConfigParams {
    pub rpc_url: String,
    pub rpc_auth: Option<BasicAuth>,
    pub registry_address: Address,
    pub creator_addresses: Vec<Address>,
    pub multicall_address: Option<Address>,
    pub network_id: Option<u64>,
    pub detect_batch_size: usize,
    pub update_batch_size: usize,
    pub debug: bool,
    pub http_port: u16,
    pub scheduler_interval: Duration,
    pub rpc_timeout: Duration,
    pub call_timeout: Duration,
    pub log_block_range: u64,
    pub registry_start_block: u64,
    pub creator_start_block: u64,
    pub data_dir: Option<PathBuf>,
    pub metrics_interval: Duration,
}

impl ServiceConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: ServiceConfigParams) -> ConfigResult<Self> {
        let ServiceConfigParams {
            rpc_url,
            rpc_auth,
            registry_address,
            mut creator_addresses,
            multicall_address,
            network_id,
            detect_batch_size,
            update_batch_size,
            debug,
            http_port,
            scheduler_interval,
            rpc_timeout,
            call_timeout,
            log_block_range,
            registry_start_block,
            creator_start_block,
            data_dir,
            metrics_interval,
        } = params;

        let mut seen = std::collections::BTreeSet::new();
        creator_addresses.retain(|address| seen.insert(*address));

        let config = Self {
            rpc_url: rpc_url.trim().to_owned(),
            rpc_auth,
            registry_address,
            creator_addresses,
            multicall_address,
            network_id,
            detect_batch_size,
            update_batch_size,
            debug,
            http_port,
            scheduler_interval,
            rpc_timeout,
            call_timeout,
            log_block_range,
            registry_start_block,
            creator_start_block,
            data_dir,
            metrics_interval,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut builder = ServiceConfig::builder()
            .rpc_url(var("CUSTOM_NODE_URL").ok_or(ConfigError::Missing("CUSTOM_NODE_URL"))?)
            .registry_address(parse_address(
                "EMP_REGISTRY_ADDRESS",
                &var("EMP_REGISTRY_ADDRESS").ok_or(ConfigError::Missing("EMP_REGISTRY_ADDRESS"))?,
            )?)
            .creator_addresses(parse_address_list(
                "LSP_CREATOR_ADDRESSES",
                &var("LSP_CREATOR_ADDRESSES")
                    .ok_or(ConfigError::Missing("LSP_CREATOR_ADDRESSES"))?,
            )?);

        if let Some(raw) = var("MULTI_CALL_2_ADDRESS") {
            builder = builder.multicall_address(parse_address("MULTI_CALL_2_ADDRESS", &raw)?);
        }
        if let Some(raw) = var("NETWORK_CHAIN_ID") {
            builder = builder.network_id(parse_number("NETWORK_CHAIN_ID", &raw)?);
        }
        if let Some(raw) = var("DETECT_CONTRACTS_BATCH_SIZE") {
            builder = builder.detect_batch_size(parse_number("DETECT_CONTRACTS_BATCH_SIZE", &raw)?);
        }
        if let Some(raw) = var("UPDATE_CONTRACTS_BATCH_SIZE") {
            builder = builder.update_batch_size(parse_number("UPDATE_CONTRACTS_BATCH_SIZE", &raw)?);
        }
        if let Some(raw) = var("DEBUG") {
            builder = builder.debug(parse_flag("DEBUG", &raw)?);
        }
        if let Some(raw) = var("HTTP_PORT") {
            builder = builder.http_port(parse_number("HTTP_PORT", &raw)?);
        }
        if let Some(raw) = var("SCHEDULER_INTERVAL_SECS") {
            builder = builder.scheduler_interval(parse_secs("SCHEDULER_INTERVAL_SECS", &raw)?);
        }
        if let Some(raw) = var("RPC_TIMEOUT_SECS") {
            builder = builder.rpc_timeout(parse_secs("RPC_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = var("CALL_TIMEOUT_SECS") {
            builder = builder.call_timeout(parse_secs("CALL_TIMEOUT_SECS", &raw)?);
        }
        if let Some(raw) = var("LOG_BLOCK_RANGE") {
            builder = builder.log_block_range(parse_number("LOG_BLOCK_RANGE", &raw)?);
        }
        if let Some(raw) = var("REGISTRY_START_BLOCK") {
            builder = builder.registry_start_block(parse_number("REGISTRY_START_BLOCK", &raw)?);
        }
        if let Some(raw) = var("CREATOR_START_BLOCK") {
            builder = builder.creator_start_block(parse_number("CREATOR_START_BLOCK", &raw)?);
        }
        if let Some(raw) = var("DATA_DIR") {
            builder = builder.data_dir(raw);
        }
        if let Some(raw) = var("METRICS_INTERVAL_SECS") {
            builder = builder.metrics_interval(parse_secs("METRICS_INTERVAL_SECS", &raw)?);
        }
        match (var("RPC_USER"), var("RPC_PASSWORD")) {
            (Some(user), Some(password)) => {
                builder = builder.rpc_auth(BasicAuth { user, password });
            }
            (None, None) => {}
            (Some(_), None) => return Err(ConfigError::Missing("RPC_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("RPC_USER")),
        }

        builder.build()
    }

    /// Ethereum JSON-RPC endpoint (including scheme).
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    pub fn rpc_auth(&self) -> Option<&BasicAuth> {
        self.rpc_auth.as_ref()
    }

    /// Registry whose `NewContractRegistered` events enumerate EMPs.
    pub fn registry_address(&self) -> Address {
        self.registry_address
    }

    /// LSP creator factories, deduplicated in configuration order.
    pub fn creator_addresses(&self) -> &[Address] {
        &self.creator_addresses
    }

    /// Multicall2 deployment; without one, reads fall back to one `eth_call` each.
    pub fn multicall_address(&self) -> Option<Address> {
        self.multicall_address
    }

    /// Configured network id; resolved through `eth_chainId` when absent.
    pub fn network_id(&self) -> Option<u64> {
        self.network_id
    }

    pub fn detect_batch_size(&self) -> usize {
        self.detect_batch_size
    }

    pub fn update_batch_size(&self) -> usize {
        self.update_batch_size
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn scheduler_interval(&self) -> Duration {
        self.scheduler_interval
    }

    /// Per-request timeout of the JSON-RPC client.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Bound on one batch call of the state fetcher.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn log_block_range(&self) -> u64 {
        self.log_block_range
    }

    pub fn registry_start_block(&self) -> u64 {
        self.registry_start_block
    }

    pub fn creator_start_block(&self) -> u64 {
        self.creator_start_block
    }

    /// Directory holding the JSON table snapshots; tables stay in memory when unset.
    pub fn data_dir(&self) -> Option<&PathBuf> {
        self.data_dir.as_ref()
    }

    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Settings of the orchestrator pass for the resolved `network_id`.
    pub fn sync_settings(&self, network_id: u64) -> SyncSettings {
        SyncSettings {
            network_id,
            registry: self.registry_address,
            creators: self.creator_addresses.clone(),
            detect_batch_size: self.detect_batch_size,
            update_batch_size: self.update_batch_size,
            call_timeout: self.call_timeout,
            registry_scan: ScanSettings {
                start_block: self.registry_start_block,
                log_block_range: self.log_block_range,
            },
            creator_scan: ScanSettings {
                start_block: self.creator_start_block,
                log_block_range: self.log_block_range,
            },
            debug: self.debug,
        }
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> ConfigResult<()> {
        validate_url(&self.rpc_url)?;

        if self.creator_addresses.is_empty() {
            return Err(ConfigError::invalid(
                "creator_addresses",
                "at least one LSP creator is required",
            ));
        }
        ensure_positive("detect_batch_size", self.detect_batch_size as u64)?;
        ensure_positive("update_batch_size", self.update_batch_size as u64)?;
        ensure_positive("log_block_range", self.log_block_range)?;
        ensure_nonzero("scheduler_interval", self.scheduler_interval)?;
        ensure_nonzero("rpc_timeout", self.rpc_timeout)?;
        ensure_nonzero("call_timeout", self.call_timeout)?;
        ensure_nonzero("metrics_interval", self.metrics_interval)?;

        if let Some(auth) = &self.rpc_auth {
            if auth.user.trim().is_empty() {
                return Err(ConfigError::invalid("rpc_user", "cannot be empty"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct ServiceConfigBuilder {
    rpc_url: Option<String>,
    rpc_auth: Option<BasicAuth>,
    registry_address: Option<Address>,
    creator_addresses: Option<Vec<Address>>,
    multicall_address: Option<Address>,
    network_id: Option<u64>,
    detect_batch_size: Option<usize>,
    update_batch_size: Option<usize>,
    debug: Option<bool>,
    http_port: Option<u16>,
    scheduler_interval: Option<Duration>,
    rpc_timeout: Option<Duration>,
    call_timeout: Option<Duration>,
    log_block_range: Option<u64>,
    registry_start_block: Option<u64>,
    creator_start_block: Option<u64>,
    data_dir: Option<PathBuf>,
    metrics_interval: Option<Duration>,
}

impl ServiceConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn rpc_auth(mut self, auth: BasicAuth) -> Self {
        self.rpc_auth = Some(auth);
        self
    }

    pub fn registry_address(mut self, address: Address) -> Self {
        self.registry_address = Some(address);
        self
    }

    pub fn creator_addresses(mut self, addresses: Vec<Address>) -> Self {
        self.creator_addresses = Some(addresses);
        self
    }

    pub fn multicall_address(mut self, address: Address) -> Self {
        self.multicall_address = Some(address);
        self
    }

    pub fn network_id(mut self, network_id: u64) -> Self {
        self.network_id = Some(network_id);
        self
    }

    pub fn detect_batch_size(mut self, size: usize) -> Self {
        self.detect_batch_size = Some(size);
        self
    }

    pub fn update_batch_size(mut self, size: usize) -> Self {
        self.update_batch_size = Some(size);
        self
    }

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = Some(debug);
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.http_port = Some(port);
        self
    }

    pub fn scheduler_interval(mut self, interval: Duration) -> Self {
        self.scheduler_interval = Some(interval);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn log_block_range(mut self, blocks: u64) -> Self {
        self.log_block_range = Some(blocks);
        self
    }

    pub fn registry_start_block(mut self, block: u64) -> Self {
        self.registry_start_block = Some(block);
        self
    }

    pub fn creator_start_block(mut self, block: u64) -> Self {
        self.creator_start_block = Some(block);
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> ConfigResult<ServiceConfig> {
        let params = ServiceConfigParams {
            rpc_url: self.rpc_url.ok_or(ConfigError::Missing("rpc_url"))?,
            rpc_auth: self.rpc_auth,
            registry_address: self
                .registry_address
                .ok_or(ConfigError::Missing("registry_address"))?,
            creator_addresses: self
                .creator_addresses
                .ok_or(ConfigError::Missing("creator_addresses"))?,
            multicall_address: self.multicall_address,
            network_id: self.network_id,
            detect_batch_size: self.detect_batch_size.unwrap_or(DEFAULT_DETECT_BATCH_SIZE),
            update_batch_size: self.update_batch_size.unwrap_or(DEFAULT_UPDATE_BATCH_SIZE),
            debug: self.debug.unwrap_or(false),
            http_port: self.http_port.unwrap_or(DEFAULT_HTTP_PORT),
            scheduler_interval: self
                .scheduler_interval
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS)),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            call_timeout: self.call_timeout.unwrap_or(DEFAULT_CALL_TIMEOUT),
            log_block_range: self.log_block_range.unwrap_or(DEFAULT_LOG_BLOCK_RANGE),
            registry_start_block: self.registry_start_block.unwrap_or(0),
            creator_start_block: self.creator_start_block.unwrap_or(0),
            data_dir: self.data_dir,
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };

        ServiceConfig::new(params)
    }
}

/// Parses a hex address. Mixed-case input must carry a valid EIP-55 checksum.
fn parse_address(field: &'static str, raw: &str) -> ConfigResult<Address> {
    let raw = raw.trim();
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    let mixed_case = digits.chars().any(|c| c.is_ascii_uppercase())
        && digits.chars().any(|c| c.is_ascii_lowercase());

    let parsed = if mixed_case {
        Address::parse_checksummed(raw, None).map_err(|err| err.to_string())
    } else {
        Address::from_str(raw).map_err(|err| err.to_string())
    };
    parsed.map_err(|reason| ConfigError::invalid(field, format!("{raw:?}: {reason}")))
}

fn parse_address_list(field: &'static str, raw: &str) -> ConfigResult<Vec<Address>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| parse_address(field, entry))
        .collect()
}

fn parse_number<T>(field: &'static str, raw: &str) -> ConfigResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|err| ConfigError::invalid(field, format!("{raw:?}: {err}")))
}

fn parse_secs(field: &'static str, raw: &str) -> ConfigResult<Duration> {
    parse_number::<u64>(field, raw).map(Duration::from_secs)
}

fn parse_flag(field: &'static str, raw: &str) -> ConfigResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(field, format!("{raw:?} is not a boolean"))),
    }
}

fn ensure_positive(field: &'static str, value: u64) -> ConfigResult<()> {
    if value == 0 {
        return Err(ConfigError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

fn ensure_nonzero(field: &'static str, value: Duration) -> ConfigResult<()> {
    if value.is_zero() {
        return Err(ConfigError::invalid(field, "must be greater than 0"));
    }
    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::invalid(
            "rpc_url",
            "must start with http:// or https://",
        ));
    }
    Ok(())
}
