//! ExpiringMultiParty contracts, discovered through the UMA registry.

use super::abi::{decode_return, encode, identifier_to_string, ExpiringMultiParty as Abi};
use super::family::{decode_phase, ensure_arity, expired_at, ContractPhase, Family};
use crate::error::CallError;
use crate::store::{AddressKind, FamilyKind, PartitionedTables, RegistrationTable, Tables};
use alloy_primitives::{Address, Bytes, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default)]
pub struct Emp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmpFields {
    pub expiration_timestamp: u64,
    pub contract_state: ContractPhase,
    pub collateral_currency: Address,
    pub token_currency: Address,
    pub price_identifier: String,
    pub total_position_collateral: U256,
    pub total_tokens_outstanding: U256,
    pub collateral_requirement: U256,
    pub min_sponsor_tokens: U256,
}

impl Family for Emp {
    type Fields = EmpFields;

    const KIND: FamilyKind = FamilyKind::Emp;

    const FIELDS: &'static [&'static str] = &[
        "expirationTimestamp",
        "contractState",
        "collateralCurrency",
        "tokenCurrency",
        "priceIdentifier",
        "totalPositionCollateral",
        "totalTokensOutstanding",
        "collateralRequirement",
        "minSponsorTokens",
    ];

    fn calls() -> Vec<Bytes> {
        vec![
            encode(Abi::expirationTimestampCall {}),
            encode(Abi::contractStateCall {}),
            encode(Abi::collateralCurrencyCall {}),
            encode(Abi::tokenCurrencyCall {}),
            encode(Abi::priceIdentifierCall {}),
            encode(Abi::totalPositionCollateralCall {}),
            encode(Abi::totalTokensOutstandingCall {}),
            encode(Abi::collateralRequirementCall {}),
            encode(Abi::minSponsorTokensCall {}),
        ]
    }

    fn decode(address: Address, outputs: &[Bytes]) -> Result<EmpFields, CallError> {
        ensure_arity(address, outputs, Self::FIELDS.len())?;

        let expiration =
            decode_return::<Abi::expirationTimestampCall>(address, Self::FIELDS[0], &outputs[0])?._0;
        let state = decode_return::<Abi::contractStateCall>(address, Self::FIELDS[1], &outputs[1])?._0;

        Ok(EmpFields {
            expiration_timestamp: u64::try_from(expiration).unwrap_or(u64::MAX),
            contract_state: decode_phase(address, state)?,
            collateral_currency: decode_return::<Abi::collateralCurrencyCall>(
                address,
                Self::FIELDS[2],
                &outputs[2],
            )?
            ._0,
            token_currency: decode_return::<Abi::tokenCurrencyCall>(
                address,
                Self::FIELDS[3],
                &outputs[3],
            )?
            ._0,
            price_identifier: identifier_to_string(
                &decode_return::<Abi::priceIdentifierCall>(address, Self::FIELDS[4], &outputs[4])?
                    ._0,
            ),
            total_position_collateral: decode_return::<Abi::totalPositionCollateralCall>(
                address,
                Self::FIELDS[5],
                &outputs[5],
            )?
            ._0,
            total_tokens_outstanding: decode_return::<Abi::totalTokensOutstandingCall>(
                address,
                Self::FIELDS[6],
                &outputs[6],
            )?
            ._0,
            collateral_requirement: decode_return::<Abi::collateralRequirementCall>(
                address,
                Self::FIELDS[7],
                &outputs[7],
            )?
            ._0,
            min_sponsor_tokens: decode_return::<Abi::minSponsorTokensCall>(
                address,
                Self::FIELDS[8],
                &outputs[8],
            )?
            ._0,
        })
    }

    fn is_expired(fields: &EmpFields, now: DateTime<Utc>) -> bool {
        expired_at(fields.expiration_timestamp, fields.contract_state, now)
    }

    fn auxiliary_addresses(fields: &EmpFields) -> Vec<(AddressKind, Address)> {
        vec![
            (AddressKind::Collateral, fields.collateral_currency),
            (AddressKind::Synthetic, fields.token_currency),
        ]
    }

    fn registrations(tables: &Tables) -> &RegistrationTable {
        &tables.registered_emps
    }

    fn state_tables(tables: &Tables) -> &PartitionedTables<EmpFields> {
        &tables.emps
    }
}
