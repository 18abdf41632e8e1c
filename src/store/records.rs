//! Row types persisted by the synchronization services.

use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Contract family tracked by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FamilyKind {
    /// ExpiringMultiParty contracts, discovered through the registry.
    Emp,
    /// LongShortPair contracts, discovered through their creators.
    Lsp,
}

impl FamilyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FamilyKind::Emp => "emp",
            FamilyKind::Lsp => "lsp",
        }
    }
}

impl fmt::Display for FamilyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle partition of a contract state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Partition {
    Active,
    Expired,
}

/// Append-only record of a discovered contract address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredContract {
    pub address: Address,
    pub family: FamilyKind,
    /// Registering account (EMP) or deployer (LSP).
    pub creator: Option<Address>,
    /// Factory or registry that emitted the discovery event.
    pub source: Address,
    pub block_number: u64,
    pub discovered_at: DateTime<Utc>,
}

/// Latest fetched state of one contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractState<F> {
    pub address: Address,
    pub fields: F,
    pub last_updated_block: u64,
    pub partition: Partition,
    pub updated_at: DateTime<Utc>,
}

/// Role an auxiliary address plays in the contract that referenced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressKind {
    Collateral,
    Synthetic,
    Long,
    Short,
}

impl AddressKind {
    pub const ALL: [AddressKind; 4] = [
        AddressKind::Collateral,
        AddressKind::Synthetic,
        AddressKind::Long,
        AddressKind::Short,
    ];
}

/// Entry of one of the collateral/synthetic/long/short address sets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
    pub address: Address,
    pub kind: AddressKind,
    /// First contract seen referencing this address.
    pub first_seen_in: Address,
}

/// Token metadata. Every field is optional because non-standard tokens exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erc20Record {
    pub address: Address,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub updated_at: DateTime<Utc>,
}

/// Next block a discovery source scans from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    pub next_block: u64,
    pub updated_at: DateTime<Utc>,
}

/// Observability record written at the end of every orchestrator pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppStats {
    pub pass: u64,
    pub run_started_at: DateTime<Utc>,
    pub run_finished_at: DateTime<Utc>,
    pub addresses_processed: u64,
    pub failures: u64,
    pub duration_ms: u64,
    pub failed_addresses: Vec<Address>,
    pub token_failures: u64,
    /// Discovery and batching errors of the pass.
    pub errors: Vec<String>,
}
