//! Error taxonomy shared by discovery, state fetching, and the table layer.
//!
//! Only [`ConfigError`] is fatal. The other kinds are scoped: a [`CallError`]
//! belongs to one address, a [`StoreError`] aborts one batch, a
//! [`DiscoveryError`] aborts one family for one pass.

use alloy_primitives::Address;
use thiserror::Error;

/// Invalid or missing startup configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure of a single on-chain read (or of every read in a failed batch).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error("call to {target} reverted")]
    Reverted { target: Address },
    #[error("failed to decode {field} returned by {target}: {reason}")]
    Decode {
        target: Address,
        field: &'static str,
        reason: String,
    },
    #[error("batch call timed out")]
    Timeout,
    #[error("batch call failed: {0}")]
    Batch(String),
}

/// Failure of the table backend.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table {table} unavailable: {reason}")]
    Unavailable { table: String, reason: String },
    #[error("table io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("table serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A registry or creator scan that failed as a whole.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("{source_id} log scan failed: {reason}")]
    Chain { source_id: String, reason: String },
    #[error("{source_id} could not persist discoveries: {error}")]
    Store {
        source_id: String,
        #[source]
        error: StoreError,
    },
    #[error("every creator scan failed: {}", .0.join("; "))]
    AllCreatorsFailed(Vec<String>),
}

/// Errors that escape a family update or a whole pass.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{family} batch calls unavailable: every one of {batches} batches failed ({last_error})")]
    BatchingUnavailable {
        family: &'static str,
        batches: usize,
        last_error: CallError,
    },
    #[error("discovery failed for every family: {}", .0.join("; "))]
    AllDiscoveryFailed(Vec<String>),
}
