//! Wire types for the Ethereum JSON-RPC methods the service uses.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// `eth_getLogs` filter for one emitter and one event signature over an
/// inclusive block range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    pub address: Address,
    #[serde(serialize_with = "quantity::serialize")]
    pub from_block: u64,
    #[serde(serialize_with = "quantity::serialize")]
    pub to_block: u64,
    #[serde(rename = "topics", serialize_with = "serialize_topic0")]
    pub topic0: B256,
}

impl LogFilter {
    pub fn new(address: Address, topic0: B256, from_block: u64, to_block: u64) -> Self {
        Self {
            address,
            from_block,
            to_block,
            topic0,
        }
    }
}

fn serialize_topic0<S>(topic0: &B256, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(1))?;
    seq.serialize_element(topic0)?;
    seq.end()
}

/// One log entry returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(with = "quantity")]
    pub block_number: u64,
    #[serde(default, with = "quantity::option")]
    pub log_index: Option<u64>,
    #[serde(default)]
    pub transaction_hash: Option<B256>,
    #[serde(default)]
    pub removed: bool,
}

/// Hex `QUANTITY` encoding (`"0x1a"`) used by Ethereum JSON-RPC.
pub(crate) mod quantity {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub(crate) fn encode(value: u64) -> String {
        format!("{value:#x}")
    }

    pub(crate) fn decode(raw: &str) -> Result<u64, String> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| format!("quantity {raw:?} is missing the 0x prefix"))?;
        if digits.is_empty() {
            return Err("empty quantity".to_string());
        }
        u64::from_str_radix(digits, 16).map_err(|err| format!("invalid quantity {raw:?}: {err}"))
    }

    pub(crate) fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&encode(*value))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        decode(&raw).map_err(D::Error::custom)
    }

    pub(crate) mod option {
        use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

        pub(crate) fn serialize<S: Serializer>(
            value: &Option<u64>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => serializer.serialize_str(&super::encode(*value)),
                None => serializer.serialize_none(),
            }
        }

        pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<u64>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| super::decode(&raw).map_err(D::Error::custom))
                .transpose()
        }
    }
}
