//! LongShortPair contracts, discovered through their creator factories.

use super::abi::{decode_return, encode, identifier_to_string, LongShortPair as Abi};
use super::family::{decode_phase, ensure_arity, expired_at, ContractPhase, Family};
use crate::error::CallError;
use crate::store::{AddressKind, FamilyKind, PartitionedTables, RegistrationTable, Tables};
use alloy_primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default)]
pub struct Lsp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspFields {
    pub expiration_timestamp: u64,
    pub contract_state: ContractPhase,
    pub collateral_token: Address,
    pub long_token: Address,
    pub short_token: Address,
    pub collateral_per_pair: U256,
    pub price_identifier: String,
    pub pair_name: String,
}

impl Family for Lsp {
    type Fields = LspFields;

    const KIND: FamilyKind = FamilyKind::Lsp;

    const FIELDS: &'static [&'static str] = &[
        "expirationTimestamp",
        "contractState",
        "collateralToken",
        "longToken",
        "shortToken",
        "collateralPerPair",
        "priceIdentifier",
        "pairName",
    ];

    fn calls() -> Vec<Bytes> {
        vec![
            encode(Abi::expirationTimestampCall {}),
            encode(Abi::contractStateCall {}),
            encode(Abi::collateralTokenCall {}),
            encode(Abi::longTokenCall {}),
            encode(Abi::shortTokenCall {}),
            encode(Abi::collateralPerPairCall {}),
            encode(Abi::priceIdentifierCall {}),
            encode(Abi::pairNameCall {}),
        ]
    }

    fn decode(address: Address, outputs: &[Bytes]) -> Result<LspFields, CallError> {
        ensure_arity(address, outputs, Self::FIELDS.len())?;
        let field = |idx: usize| (Self::FIELDS[idx], &outputs[idx][..]);

        let (name, data) = field(0);
        let expiration_timestamp = decode_return::<Abi::expirationTimestampCall>(address, name, data)?._0;
        let (name, data) = field(1);
        let contract_state =
            decode_phase(address, decode_return::<Abi::contractStateCall>(address, name, data)?._0)?;
        let (name, data) = field(2);
        let collateral_token = decode_return::<Abi::collateralTokenCall>(address, name, data)?._0;
        let (name, data) = field(3);
        let long_token = decode_return::<Abi::longTokenCall>(address, name, data)?._0;
        let (name, data) = field(4);
        let short_token = decode_return::<Abi::shortTokenCall>(address, name, data)?._0;
        let (name, data) = field(5);
        let collateral_per_pair = decode_return::<Abi::collateralPerPairCall>(address, name, data)?._0;
        let (name, data) = field(6);
        let price_identifier =
            identifier_to_string(&decode_return::<Abi::priceIdentifierCall>(address, name, data)?._0);
        let (name, data) = field(7);
        let pair_name = decode_return::<Abi::pairNameCall>(address, name, data)?._0;

        Ok(LspFields {
            expiration_timestamp,
            contract_state,
            collateral_token,
            long_token,
            short_token,
            collateral_per_pair,
            price_identifier,
            pair_name,
        })
    }

    fn is_expired(fields: &LspFields, now: DateTime<Utc>) -> bool {
        expired_at(fields.expiration_timestamp, fields.contract_state, now)
    }

    fn auxiliary_addresses(fields: &LspFields) -> Vec<(AddressKind, Address)> {
        vec![
            (AddressKind::Collateral, fields.collateral_token),
            (AddressKind::Long, fields.long_token),
            (AddressKind::Short, fields.short_token),
        ]
    }

    fn registrations(tables: &Tables) -> &RegistrationTable {
        &tables.registered_lsps
    }

    fn state_tables(tables: &Tables) -> &PartitionedTables<LspFields> {
        &tables.lsps
    }
}
