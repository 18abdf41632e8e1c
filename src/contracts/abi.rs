//! Solidity interfaces of the contracts the service reads, plus decoding
//! helpers that turn ABI failures into [`CallError`]s.

use crate::error::CallError;
use alloy_primitives::{Address, Bytes, FixedBytes};
use alloy_sol_types::{sol, SolCall};

sol! {
    interface ExpiringMultiParty {
        function expirationTimestamp() external view returns (uint256);
        function contractState() external view returns (uint8);
        function collateralCurrency() external view returns (address);
        function tokenCurrency() external view returns (address);
        function priceIdentifier() external view returns (bytes32);
        // FixedPoint.Unsigned is a single-word struct; it encodes as uint256.
        function totalPositionCollateral() external view returns (uint256);
        function totalTokensOutstanding() external view returns (uint256);
        function collateralRequirement() external view returns (uint256);
        function minSponsorTokens() external view returns (uint256);
    }

    interface LongShortPair {
        function expirationTimestamp() external view returns (uint64);
        function contractState() external view returns (uint8);
        function collateralToken() external view returns (address);
        function longToken() external view returns (address);
        function shortToken() external view returns (address);
        function collateralPerPair() external view returns (uint256);
        function priceIdentifier() external view returns (bytes32);
        function pairName() external view returns (string);
    }

    interface Erc20 {
        function symbol() external view returns (string);
        function name() external view returns (string);
        function decimals() external view returns (uint8);
    }

    interface Registry {
        event NewContractRegistered(address indexed contractAddress, address indexed creator, address[] parties);
    }

    interface LongShortPairCreator {
        event CreatedLongShortPair(address indexed longShortPair, address indexed deployerAddress, address longToken, address shortToken);
    }

    interface Multicall2 {
        struct Call {
            address target;
            bytes callData;
        }

        struct CallResult {
            bool success;
            bytes returnData;
        }

        function tryBlockAndAggregate(bool requireSuccess, Call[] calls)
            external
            returns (uint256 blockNumber, bytes32 blockHash, CallResult[] returnData);
    }
}

/// Calldata of an argument-less call.
pub(crate) fn encode<C: SolCall>(call: C) -> Bytes {
    Bytes::from(call.abi_encode())
}

/// Decodes the return data of `C`, attributing failures to `target` and `field`.
pub(crate) fn decode_return<C: SolCall>(
    target: Address,
    field: &'static str,
    data: &[u8],
) -> Result<C::Return, CallError> {
    C::abi_decode_returns(data, true).map_err(|err| CallError::Decode {
        target,
        field,
        reason: err.to_string(),
    })
}

/// UMA price identifiers are right-padded ASCII in a `bytes32`.
pub(crate) fn identifier_to_string(raw: &FixedBytes<32>) -> String {
    let end = raw
        .iter()
        .rposition(|byte| *byte != 0)
        .map(|idx| idx + 1)
        .unwrap_or(0);
    String::from_utf8_lossy(&raw[..end]).into_owned()
}
