use super::discovery::{Announcement, LogScan, ScanReport, ScanSettings};
use super::Clock;
use crate::contracts::abi::Registry;
use crate::error::DiscoveryError;
use crate::rpc::{ChainClient, ChainLog};
use crate::store::{FamilyKind, Tables};
use alloy_primitives::Address;
use alloy_sol_types::SolEvent;
use std::sync::Arc;

/// Discovers EMP contracts from the registry's `NewContractRegistered` events.
pub struct RegistryDiscovery {
    client: Arc<dyn ChainClient>,
    tables: Tables,
    registry: Address,
    network_id: u64,
    settings: ScanSettings,
    clock: Clock,
}

impl RegistryDiscovery {
    pub fn new(
        client: Arc<dyn ChainClient>,
        tables: Tables,
        registry: Address,
        network_id: u64,
        settings: ScanSettings,
        clock: Clock,
    ) -> Self {
        Self {
            client,
            tables,
            registry,
            network_id,
            settings,
            clock,
        }
    }

    pub fn registry(&self) -> Address {
        self.registry
    }

    pub fn cursor_key(&self) -> String {
        format!("registry:{}", self.registry)
    }

    /// Records contracts registered since the last successful sync.
    pub async fn sync(&self) -> Result<ScanReport, DiscoveryError> {
        let scan = LogScan {
            client: &self.client,
            registrations: &self.tables.registered_emps,
            cursors: &self.tables.cursors,
            family: FamilyKind::Emp,
            settings: self.settings,
            clock: &self.clock,
        };

        let result = scan
            .run(
                self.registry,
                self.cursor_key(),
                Registry::NewContractRegistered::SIGNATURE_HASH,
                decode_registration,
            )
            .await;

        if let Err(err) = &result {
            tracing::warn!(
                network_id = self.network_id,
                registry = %self.registry,
                error = %err,
                "registry discovery failed"
            );
        }
        result
    }
}

fn decode_registration(log: &ChainLog) -> Option<Announcement> {
    let event = Registry::NewContractRegistered::decode_raw_log(
        log.topics.iter().copied(),
        &log.data,
        true,
    )
    .ok()?;
    Some(Announcement {
        address: event.contractAddress,
        creator: Some(event.creator),
        block_number: log.block_number,
    })
}
