//! Cursor-driven log scanning shared by the registry and creator discovery
//! services.
//!
//! A scan reads the cursor of its source, pages `eth_getLogs` from there to
//! the chain head, records contracts that are not known yet, and only then
//! advances the cursor. Any failure leaves the cursor where it was, so the
//! next pass rescans the same range and the registration upserts make the
//! rescan harmless.

use super::Clock;
use crate::error::{DiscoveryError, StoreError};
use crate::rpc::{ChainClient, ChainLog, LogFilter};
use crate::store::{FamilyKind, RegisteredContract, RegistrationTable, SharedTable, SyncCursor};
use alloy_primitives::{Address, B256};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const DEFAULT_LOG_BLOCK_RANGE: u64 = 10_000;

/// Where a discovery source starts on its first pass and how wide each
/// `eth_getLogs` window may be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSettings {
    pub start_block: u64,
    pub log_block_range: u64,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            start_block: 0,
            log_block_range: DEFAULT_LOG_BLOCK_RANGE,
        }
    }
}

/// A contract announced by a discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Announcement {
    pub(crate) address: Address,
    pub(crate) creator: Option<Address>,
    pub(crate) block_number: u64,
}

/// Outcome of one successful scan of one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub source: Address,
    /// Inclusive block range scanned; `None` when the cursor was already past the head.
    pub scanned: Option<(u64, u64)>,
    pub logs: usize,
    pub new_contracts: Vec<Address>,
}

/// Everything a scan needs besides the source-specific event decoding.
pub(crate) struct LogScan<'a> {
    pub(crate) client: &'a Arc<dyn ChainClient>,
    pub(crate) registrations: &'a RegistrationTable,
    pub(crate) cursors: &'a SharedTable<String, SyncCursor>,
    pub(crate) family: FamilyKind,
    pub(crate) settings: ScanSettings,
    pub(crate) clock: &'a Clock,
}

impl LogScan<'_> {
    pub(crate) async fn run<D>(
        &self,
        source: Address,
        cursor_key: String,
        topic0: B256,
        decode: D,
    ) -> Result<ScanReport, DiscoveryError>
    where
        D: Fn(&ChainLog) -> Option<Announcement>,
    {
        let source_id = cursor_key.clone();
        let store_error = |error: StoreError| DiscoveryError::Store {
            source_id: source_id.clone(),
            error,
        };
        let chain_error = |err: anyhow::Error| DiscoveryError::Chain {
            source_id: source_id.clone(),
            reason: format!("{err:#}"),
        };

        let from_block = self
            .cursors
            .get(&cursor_key)
            .await
            .map_err(store_error)?
            .map(|cursor| cursor.next_block)
            .unwrap_or(self.settings.start_block);
        let head = self.client.block_number().await.map_err(chain_error)?;

        if from_block > head {
            tracing::debug!(source = %source, from_block, head, "discovery source is up to date");
            return Ok(ScanReport {
                source,
                scanned: None,
                logs: 0,
                new_contracts: Vec::new(),
            });
        }

        let window = self.settings.log_block_range.max(1);
        let mut logs = Vec::new();
        let mut start = from_block;
        while start <= head {
            let end = start.saturating_add(window - 1).min(head);
            let filter = LogFilter::new(source, topic0, start, end);
            let page = self.client.get_logs(&filter).await.map_err(chain_error)?;
            tracing::trace!(source = %source, start, end, count = page.len(), "fetched log page");
            logs.extend(page);
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }

        let mut announcements = Vec::with_capacity(logs.len());
        for log in logs.iter().filter(|log| !log.removed) {
            match decode(log) {
                Some(announcement) => announcements.push(announcement),
                None => tracing::warn!(
                    source = %source,
                    block = log.block_number,
                    "skipping undecodable discovery log"
                ),
            }
        }
        announcements.sort_by_key(|announcement| announcement.block_number);

        let now = (self.clock)();
        let mut seen = BTreeSet::new();
        let mut rows = Vec::new();
        for announcement in announcements {
            if !seen.insert(announcement.address) {
                continue;
            }
            let known = self
                .registrations
                .has(&announcement.address)
                .await
                .map_err(store_error)?;
            if known {
                continue;
            }
            let row = RegisteredContract {
                address: announcement.address,
                family: self.family,
                creator: announcement.creator,
                source,
                block_number: announcement.block_number,
                discovered_at: now,
            };
            rows.push((announcement.address, row));
        }
        let new_contracts: Vec<Address> = rows.iter().map(|(address, _)| *address).collect();
        self.registrations
            .upsert_many(rows)
            .await
            .map_err(store_error)?;

        let next_block = head.saturating_add(1);
        self.cursors
            .upsert(
                cursor_key,
                SyncCursor {
                    next_block,
                    updated_at: now,
                },
            )
            .await
            .map_err(store_error)?;

        tracing::info!(
            family = %self.family,
            source = %source,
            from_block,
            to_block = head,
            logs = logs.len(),
            new = new_contracts.len(),
            "discovery scan completed"
        );

        Ok(ScanReport {
            source,
            scanned: Some((from_block, head)),
            logs: logs.len(),
            new_contracts,
        })
    }
}
