//! Batched refresh of one family's contract state rows.

use super::Clock;
use crate::contracts::{CallBatcher, ContractCall, Family};
use crate::error::{CallError, StoreError, SyncError};
use crate::store::{AddressKind, ContractState, Partition, PartitionedTables, Tables};
use alloy_primitives::{Address, Bytes};
use std::collections::BTreeSet;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// An address whose refresh failed this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressFailure {
    pub address: Address,
    pub reason: String,
}

/// Token address referenced by a refreshed contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AuxiliaryAddress {
    pub address: Address,
    pub kind: AddressKind,
    pub referenced_by: Address,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateReport {
    pub requested: usize,
    pub batches: usize,
    pub failed_batches: usize,
    pub active: usize,
    pub expired: usize,
    /// Rows moved from the active to the expired table.
    pub moved_to_expired: usize,
    pub failures: Vec<AddressFailure>,
    pub auxiliary: Vec<AuxiliaryAddress>,
}

impl UpdateReport {
    pub fn updated(&self) -> usize {
        self.active + self.expired
    }

    fn fail(&mut self, address: Address, reason: impl ToString) {
        self.failures.push(AddressFailure {
            address,
            reason: reason.to_string(),
        });
    }
}

/// Keeps the active/expired state tables of family `F` current.
pub struct StateFetcher<F: Family> {
    batcher: Arc<dyn CallBatcher>,
    tables: PartitionedTables<F::Fields>,
    call_timeout: Duration,
    clock: Clock,
    _family: PhantomData<fn() -> F>,
}

impl<F: Family> StateFetcher<F> {
    pub fn new(
        batcher: Arc<dyn CallBatcher>,
        tables: &Tables,
        call_timeout: Duration,
        clock: Clock,
    ) -> Self {
        Self {
            batcher,
            tables: F::state_tables(tables).clone(),
            call_timeout,
            clock,
            _family: PhantomData,
        }
    }

    /// Refreshes `addresses` in batches of `batch_size` addresses, one batch
    /// call per batch, in address order.
    ///
    /// Per-address failures land in the report. The only error is every
    /// batch failing at the call layer.
    pub async fn update(
        &self,
        addresses: &BTreeSet<Address>,
        batch_size: usize,
    ) -> Result<UpdateReport, SyncError> {
        let mut report = UpdateReport {
            requested: addresses.len(),
            ..UpdateReport::default()
        };
        if addresses.is_empty() {
            return Ok(report);
        }

        let ordered: Vec<Address> = addresses.iter().copied().collect();
        let mut last_error = None;

        for chunk in ordered.chunks(batch_size.max(1)) {
            report.batches += 1;
            match self.fetch_batch(chunk).await {
                Ok((block_number, outputs)) => {
                    self.apply_batch(chunk, block_number, outputs, &mut report)
                        .await;
                }
                Err(err) => {
                    tracing::warn!(
                        family = %F::KIND,
                        batcher = self.batcher.name(),
                        addresses = chunk.len(),
                        error = %err,
                        "state batch failed"
                    );
                    report.failed_batches += 1;
                    for address in chunk {
                        report.fail(*address, &err);
                    }
                    last_error = Some(err);
                }
            }
        }

        if report.failed_batches == report.batches {
            if let Some(last_error) = last_error {
                return Err(SyncError::BatchingUnavailable {
                    family: F::KIND.as_str(),
                    batches: report.batches,
                    last_error,
                });
            }
        }

        tracing::debug!(
            family = %F::KIND,
            requested = report.requested,
            batches = report.batches,
            active = report.active,
            expired = report.expired,
            failures = report.failures.len(),
            "state update finished"
        );
        Ok(report)
    }

    /// Runs one batch call and regroups its results per address.
    async fn fetch_batch(
        &self,
        chunk: &[Address],
    ) -> Result<(u64, Vec<Result<Vec<Bytes>, CallError>>), CallError> {
        let per_address = F::calls();
        let calls: Vec<ContractCall> = chunk
            .iter()
            .flat_map(|address| {
                per_address.iter().map(move |data| ContractCall {
                    target: *address,
                    data: data.clone(),
                })
            })
            .collect();

        let output = timeout(self.call_timeout, self.batcher.execute(&calls))
            .await
            .map_err(|_| CallError::Timeout)??;

        if output.results.len() != calls.len() {
            return Err(CallError::Batch(format!(
                "{} returned {} results for {} calls",
                self.batcher.name(),
                output.results.len(),
                calls.len()
            )));
        }

        let mut results = output.results.into_iter();
        let grouped = chunk
            .iter()
            .map(|_| {
                let slice: Vec<Result<Bytes, CallError>> =
                    results.by_ref().take(per_address.len()).collect();
                slice.into_iter().collect::<Result<Vec<Bytes>, CallError>>()
            })
            .collect();
        Ok((output.block_number, grouped))
    }

    async fn apply_batch(
        &self,
        chunk: &[Address],
        block_number: u64,
        outputs: Vec<Result<Vec<Bytes>, CallError>>,
        report: &mut UpdateReport,
    ) {
        let mut decoded = Vec::with_capacity(chunk.len());
        for (address, output) in chunk.iter().zip(outputs) {
            match output.and_then(|raw| F::decode(*address, &raw)) {
                Ok(fields) => decoded.push((*address, fields)),
                Err(err) => {
                    tracing::debug!(family = %F::KIND, address = %address, error = %err, "contract read failed");
                    report.fail(*address, err);
                }
            }
        }
        if decoded.is_empty() {
            return;
        }

        let pending: Vec<Address> = decoded.iter().map(|(address, _)| *address).collect();
        match self.write_batch(decoded, block_number).await {
            Ok(written) => {
                report.active += written.active;
                report.expired += written.expired;
                report.moved_to_expired += written.moved;
                report.auxiliary.extend(written.auxiliary);
            }
            Err(err) => {
                tracing::error!(
                    family = %F::KIND,
                    addresses = pending.len(),
                    error = %err,
                    "state write failed; abandoning the batch"
                );
                for address in pending {
                    report.fail(address, &err);
                }
            }
        }
    }

    /// Upserts the batch into each partition with one write per table, then
    /// removes the expired rows from the active table. Expired rows never
    /// return to the active table.
    async fn write_batch(
        &self,
        decoded: Vec<(Address, F::Fields)>,
        block_number: u64,
    ) -> Result<BatchWrite, StoreError> {
        let now = (self.clock)();
        let mut written = BatchWrite::default();
        let mut active = Vec::new();
        let mut expired = Vec::new();

        for (address, fields) in decoded {
            let already_expired = self.tables.expired.has(&address).await?;
            let partition = if already_expired || F::is_expired(&fields, now) {
                Partition::Expired
            } else {
                Partition::Active
            };
            written
                .auxiliary
                .extend(F::auxiliary_addresses(&fields).into_iter().map(|(kind, token)| {
                    AuxiliaryAddress {
                        address: token,
                        kind,
                        referenced_by: address,
                    }
                }));
            let row = ContractState {
                address,
                fields,
                last_updated_block: block_number,
                partition,
                updated_at: now,
            };
            match partition {
                Partition::Active => active.push((address, row)),
                Partition::Expired => expired.push((address, row)),
            }
        }

        written.active = active.len();
        written.expired = expired.len();
        if !expired.is_empty() {
            let keys: Vec<Address> = expired.iter().map(|(address, _)| *address).collect();
            self.tables.expired.upsert_many(expired).await?;
            written.moved = self.tables.active.delete_many(&keys).await?;
            if written.moved > 0 {
                tracing::info!(family = %F::KIND, moved = written.moved, "contracts expired");
            }
        }
        if !active.is_empty() {
            self.tables.active.upsert_many(active).await?;
        }
        Ok(written)
    }
}

#[derive(Default)]
struct BatchWrite {
    active: usize,
    expired: usize,
    moved: usize,
    auxiliary: Vec<AuxiliaryAddress>,
}
