use super::discovery::{Announcement, LogScan, ScanReport, ScanSettings};
use super::Clock;
use crate::contracts::abi::LongShortPairCreator;
use crate::error::DiscoveryError;
use crate::rpc::{ChainClient, ChainLog};
use crate::store::{FamilyKind, Tables};
use alloy_primitives::Address;
use alloy_sol_types::SolEvent;
use futures::future::join_all;
use std::sync::Arc;

/// Result of scanning every configured creator. Per-creator failures are
/// reported here; the sync only fails when no creator could be scanned.
#[derive(Debug, Default)]
pub struct CreatorReport {
    pub scans: Vec<ScanReport>,
    pub failures: Vec<(Address, DiscoveryError)>,
}

impl CreatorReport {
    pub fn new_contracts(&self) -> usize {
        self.scans.iter().map(|scan| scan.new_contracts.len()).sum()
    }
}

/// Discovers LSP contracts from the `CreatedLongShortPair` events of an
/// allow-list of creator factories, each with its own cursor.
pub struct CreatorDiscovery {
    client: Arc<dyn ChainClient>,
    tables: Tables,
    creators: Vec<Address>,
    settings: ScanSettings,
    clock: Clock,
}

impl CreatorDiscovery {
    pub fn new(
        client: Arc<dyn ChainClient>,
        tables: Tables,
        creators: Vec<Address>,
        settings: ScanSettings,
        clock: Clock,
    ) -> Self {
        Self {
            client,
            tables,
            creators,
            settings,
            clock,
        }
    }

    pub fn creators(&self) -> &[Address] {
        &self.creators
    }

    pub fn cursor_key(creator: Address) -> String {
        format!("creator:{creator}")
    }

    pub async fn sync(&self) -> Result<CreatorReport, DiscoveryError> {
        let scans = self.creators.iter().map(|creator| async move {
            let result = self.sync_creator(*creator).await;
            (*creator, result)
        });

        let mut report = CreatorReport::default();
        for (creator, result) in join_all(scans).await {
            match result {
                Ok(scan) => report.scans.push(scan),
                Err(err) => {
                    tracing::warn!(creator = %creator, error = %err, "creator discovery failed");
                    report.failures.push((creator, err));
                }
            }
        }

        if report.scans.is_empty() && !report.failures.is_empty() {
            let reasons = report
                .failures
                .iter()
                .map(|(_, err)| err.to_string())
                .collect();
            return Err(DiscoveryError::AllCreatorsFailed(reasons));
        }
        Ok(report)
    }

    async fn sync_creator(&self, creator: Address) -> Result<ScanReport, DiscoveryError> {
        let scan = LogScan {
            client: &self.client,
            registrations: &self.tables.registered_lsps,
            cursors: &self.tables.cursors,
            family: FamilyKind::Lsp,
            settings: self.settings,
            clock: &self.clock,
        };
        scan.run(
            creator,
            Self::cursor_key(creator),
            LongShortPairCreator::CreatedLongShortPair::SIGNATURE_HASH,
            decode_creation,
        )
        .await
    }
}

fn decode_creation(log: &ChainLog) -> Option<Announcement> {
    let event = LongShortPairCreator::CreatedLongShortPair::decode_raw_log(
        log.topics.iter().copied(),
        &log.data,
        true,
    )
    .ok()?;
    Some(Announcement {
        address: event.longShortPair,
        creator: Some(event.deployerAddress),
        block_number: log.block_number,
    })
}
