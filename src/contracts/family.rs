use crate::error::CallError;
use crate::store::{AddressKind, FamilyKind, PartitionedTables, RegistrationTable, TableValue, Tables};
use alloy_primitives::{Address, Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle enum shared by EMP and LSP contracts (`contractState()`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContractPhase {
    Open,
    ExpiredPriceRequested,
    ExpiredPriceReceived,
}

impl ContractPhase {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Open),
            1 => Some(Self::ExpiredPriceRequested),
            2 => Some(Self::ExpiredPriceReceived),
            _ => None,
        }
    }
}

/// Expired once settlement started or the expiration timestamp passed.
pub fn expired_at(expiration_timestamp: u64, phase: ContractPhase, now: DateTime<Utc>) -> bool {
    if phase != ContractPhase::Open {
        return true;
    }
    let now = u64::try_from(now.timestamp()).unwrap_or(0);
    expiration_timestamp <= now
}

/// A tracked contract family: which reads describe an instance, how to decode
/// them, when an instance counts as expired, and where its rows live.
pub trait Family: Send + Sync + 'static {
    type Fields: TableValue + PartialEq;

    const KIND: FamilyKind;

    /// Names of the fields read per address, in call order.
    const FIELDS: &'static [&'static str];

    /// Calldata for every field read, aligned with [`Family::FIELDS`].
    fn calls() -> Vec<Bytes>;

    /// Decodes one address's outputs, aligned with [`Family::calls`].
    fn decode(address: Address, outputs: &[Bytes]) -> Result<Self::Fields, CallError>;

    fn is_expired(fields: &Self::Fields, now: DateTime<Utc>) -> bool;

    /// Token addresses referenced by an instance, tagged with their role.
    fn auxiliary_addresses(fields: &Self::Fields) -> Vec<(AddressKind, Address)>;

    fn registrations(tables: &Tables) -> &RegistrationTable;

    fn state_tables(tables: &Tables) -> &PartitionedTables<Self::Fields>;
}

pub(crate) fn ensure_arity(
    address: Address,
    outputs: &[Bytes],
    expected: usize,
) -> Result<(), CallError> {
    if outputs.len() == expected {
        return Ok(());
    }
    Err(CallError::Batch(format!(
        "expected {expected} outputs for {address}, got {}",
        outputs.len()
    )))
}

pub(crate) fn decode_phase(address: Address, raw: u8) -> Result<ContractPhase, CallError> {
    ContractPhase::from_raw(raw).ok_or_else(|| CallError::Decode {
        target: address,
        field: "contractState",
        reason: format!("unknown contract state {raw}"),
    })
}
