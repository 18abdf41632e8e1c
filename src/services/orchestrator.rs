//! One synchronization pass across both contract families.
//!
//! A pass runs registry and creator discovery concurrently, refreshes each
//! family whose discovery succeeded, records the tokens those contracts
//! reference, and writes an [`AppStats`] row. Per-address failures never fail
//! the pass; only every discovery path failing does.

use super::creator::CreatorDiscovery;
use super::discovery::ScanSettings;
use super::registry::RegistryDiscovery;
use super::state::{AddressFailure, AuxiliaryAddress, StateFetcher, UpdateReport};
use super::tokens::{TokenReport, TokenService};
use super::Clock;
use crate::contracts::{CallBatcher, Emp, Family, Lsp};
use crate::error::{StoreError, SyncError};
use crate::rpc::ChainClient;
use crate::runtime::profile::{PhaseTiming, Profile};
use crate::runtime::scheduler::SyncPass;
use crate::runtime::telemetry::Telemetry;
use crate::store::{AppStats, FamilyKind, Tables};
use alloy_primitives::Address;
use futures::future::BoxFuture;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Key of the single [`AppStats`] row, overwritten every pass.
pub const APP_STATS_KEY: &str = "latest";

pub const DEFAULT_DETECT_BATCH_SIZE: usize = 50;
pub const DEFAULT_UPDATE_BATCH_SIZE: usize = 100;

/// Everything a pass needs to know about the deployment it synchronizes.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub network_id: u64,
    pub registry: Address,
    pub creators: Vec<Address>,
    /// Batch size for addresses without a state row yet.
    pub detect_batch_size: usize,
    /// Batch size for refreshing active rows.
    pub update_batch_size: usize,
    pub call_timeout: Duration,
    pub registry_scan: ScanSettings,
    pub creator_scan: ScanSettings,
    pub debug: bool,
}

/// Per-family outcome of a pass.
#[derive(Debug, Clone)]
pub struct FamilySummary {
    pub family: FamilyKind,
    /// Contracts discovered this pass; `None` when discovery failed.
    pub discovered: Option<usize>,
    pub new_addresses: usize,
    pub known_addresses: usize,
    pub detect: UpdateReport,
    pub update: UpdateReport,
    /// Failures of a discovery source, a state batch layer, or the tables.
    pub errors: Vec<String>,
}

impl FamilySummary {
    fn new(family: FamilyKind, discovered: Option<usize>) -> Self {
        Self {
            family,
            discovered,
            new_addresses: 0,
            known_addresses: 0,
            detect: UpdateReport::default(),
            update: UpdateReport::default(),
            errors: Vec::new(),
        }
    }

    pub fn processed(&self) -> usize {
        self.new_addresses + self.known_addresses
    }

    pub fn failures(&self) -> impl Iterator<Item = &AddressFailure> {
        self.detect.failures.iter().chain(self.update.failures.iter())
    }

    fn auxiliary(&self) -> impl Iterator<Item = &AuxiliaryAddress> {
        self.detect.auxiliary.iter().chain(self.update.auxiliary.iter())
    }

    fn batch_calls(&self) -> usize {
        self.detect.batches + self.update.batches
    }
}

#[derive(Debug, Clone)]
pub struct PassSummary {
    pub pass: u64,
    pub emp: FamilySummary,
    pub lsp: FamilySummary,
    pub tokens: TokenReport,
    pub timings: Vec<PhaseTiming>,
    pub stats: AppStats,
}

pub struct ContractsOrchestrator {
    registry: RegistryDiscovery,
    creators: CreatorDiscovery,
    emps: StateFetcher<Emp>,
    lsps: StateFetcher<Lsp>,
    tokens: TokenService,
    tables: Tables,
    settings: SyncSettings,
    telemetry: Arc<Telemetry>,
    profile: Profile,
    clock: Clock,
    passes: AtomicU64,
}

impl ContractsOrchestrator {
    pub fn new(
        client: Arc<dyn ChainClient>,
        batcher: Arc<dyn CallBatcher>,
        tables: Tables,
        settings: SyncSettings,
        telemetry: Arc<Telemetry>,
        clock: Clock,
    ) -> Self {
        let registry = RegistryDiscovery::new(
            client.clone(),
            tables.clone(),
            settings.registry,
            settings.network_id,
            settings.registry_scan,
            clock.clone(),
        );
        let creators = CreatorDiscovery::new(
            client,
            tables.clone(),
            settings.creators.clone(),
            settings.creator_scan,
            clock.clone(),
        );
        let emps = StateFetcher::new(batcher.clone(), &tables, settings.call_timeout, clock.clone());
        let lsps = StateFetcher::new(batcher.clone(), &tables, settings.call_timeout, clock.clone());
        let tokens = TokenService::new(
            batcher,
            tables.clone(),
            settings.update_batch_size,
            settings.call_timeout,
            clock.clone(),
        );

        Self {
            registry,
            creators,
            emps,
            lsps,
            tokens,
            tables,
            profile: Profile::new(settings.debug),
            settings,
            telemetry,
            clock,
            passes: AtomicU64::new(0),
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Relaxed)
    }

    pub async fn run(&self) -> Result<PassSummary, SyncError> {
        let pass = self.passes.fetch_add(1, Ordering::Relaxed) + 1;
        let started_at = (self.clock)();
        let started = Instant::now();
        let mut timings = Vec::new();
        self.telemetry.record_pass_started();
        tracing::info!(pass, network_id = self.settings.network_id, "sync pass started");

        let timer = self.profile.start("discovery");
        let (registry, creators) = tokio::join!(self.registry.sync(), self.creators.sync());
        timings.push(timer.finish());

        let mut emp = match registry {
            Ok(scan) => FamilySummary::new(FamilyKind::Emp, Some(scan.new_contracts.len())),
            Err(err) => {
                let mut summary = FamilySummary::new(FamilyKind::Emp, None);
                summary.errors.push(format!("registry discovery: {err}"));
                summary
            }
        };
        let mut lsp = match creators {
            Ok(report) => {
                let mut summary = FamilySummary::new(FamilyKind::Lsp, Some(report.new_contracts()));
                for (creator, err) in &report.failures {
                    summary.errors.push(format!("creator {creator} discovery: {err}"));
                }
                summary
            }
            Err(err) => {
                let mut summary = FamilySummary::new(FamilyKind::Lsp, None);
                summary.errors.push(format!("creator discovery: {err}"));
                summary
            }
        };

        if emp.discovered.is_none() && lsp.discovered.is_none() {
            let errors: Vec<String> = emp.errors.iter().chain(&lsp.errors).cloned().collect();
            let stats = AppStats {
                pass,
                run_started_at: started_at,
                run_finished_at: (self.clock)(),
                addresses_processed: 0,
                failures: 0,
                duration_ms: elapsed_ms(started),
                failed_addresses: Vec::new(),
                token_failures: 0,
                errors: errors.clone(),
            };
            self.write_stats(&stats).await;
            self.telemetry.record_pass_failed();
            tracing::error!(pass, errors = ?errors, "discovery failed for every family");
            return Err(SyncError::AllDiscoveryFailed(errors));
        }

        let (emp_timings, lsp_timings) = tokio::join!(
            self.sync_family(&self.emps, &mut emp),
            self.sync_family(&self.lsps, &mut lsp),
        );
        timings.extend(emp_timings);
        timings.extend(lsp_timings);

        let references: Vec<AuxiliaryAddress> =
            emp.auxiliary().chain(lsp.auxiliary()).copied().collect();
        let timer = self.profile.start("tokens");
        let tokens = self.tokens.sync(&references).await;
        timings.push(timer.finish());

        let failed_addresses: BTreeSet<Address> = emp
            .failures()
            .chain(lsp.failures())
            .map(|failure| failure.address)
            .collect();
        let processed = emp.processed() + lsp.processed();
        let stats = AppStats {
            pass,
            run_started_at: started_at,
            run_finished_at: (self.clock)(),
            addresses_processed: processed as u64,
            failures: failed_addresses.len() as u64,
            duration_ms: elapsed_ms(started),
            failed_addresses: failed_addresses.into_iter().collect(),
            token_failures: tokens.failures.len() as u64,
            errors: emp.errors.iter().chain(&lsp.errors).cloned().collect(),
        };
        self.write_stats(&stats).await;

        self.telemetry
            .record_addresses(stats.addresses_processed, stats.failures);
        self.telemetry
            .record_batch_calls((emp.batch_calls() + lsp.batch_calls()) as u64);
        self.telemetry.record_token_failures(stats.token_failures);
        self.telemetry.record_pass_completed();

        tracing::info!(
            pass,
            processed = stats.addresses_processed,
            failures = stats.failures,
            emp_new = emp.new_addresses,
            emp_known = emp.known_addresses,
            lsp_new = lsp.new_addresses,
            lsp_known = lsp.known_addresses,
            tokens_fetched = tokens.fetched,
            token_failures = stats.token_failures,
            duration_ms = stats.duration_ms,
            "sync pass finished"
        );

        Ok(PassSummary {
            pass,
            emp,
            lsp,
            tokens,
            timings,
            stats,
        })
    }

    /// Detects new addresses, then refreshes active ones. Skipped when the
    /// family's discovery failed this pass.
    async fn sync_family<F: Family>(
        &self,
        fetcher: &StateFetcher<F>,
        summary: &mut FamilySummary,
    ) -> Vec<PhaseTiming> {
        let mut timings = Vec::new();
        if summary.discovered.is_none() {
            tracing::warn!(family = %F::KIND, "skipping state sync after failed discovery");
            return timings;
        }

        let (new, known) = match self.partition_addresses::<F>().await {
            Ok(sets) => sets,
            Err(err) => {
                tracing::error!(family = %F::KIND, error = %err, "failed to load known addresses");
                summary.errors.push(format!("{} tables: {err}", F::KIND));
                return timings;
            }
        };
        summary.new_addresses = new.len();
        summary.known_addresses = known.len();

        let timer = self.profile.start(format!("{}.detect", F::KIND));
        let detect = self
            .run_update(fetcher, &new, self.settings.detect_batch_size, summary)
            .await;
        summary.detect = detect;
        timings.push(timer.finish());

        let timer = self.profile.start(format!("{}.update", F::KIND));
        let update = self
            .run_update(fetcher, &known, self.settings.update_batch_size, summary)
            .await;
        summary.update = update;
        timings.push(timer.finish());

        timings
    }

    async fn run_update<F: Family>(
        &self,
        fetcher: &StateFetcher<F>,
        addresses: &BTreeSet<Address>,
        batch_size: usize,
        summary: &mut FamilySummary,
    ) -> UpdateReport {
        match fetcher.update(addresses, batch_size).await {
            Ok(report) => report,
            Err(err) => {
                tracing::error!(family = %F::KIND, error = %err, "state update failed");
                summary.errors.push(err.to_string());
                let batches = addresses.len().div_ceil(batch_size.max(1));
                UpdateReport {
                    requested: addresses.len(),
                    batches,
                    failed_batches: batches,
                    failures: addresses
                        .iter()
                        .map(|address| AddressFailure {
                            address: *address,
                            reason: err.to_string(),
                        })
                        .collect(),
                    ..UpdateReport::default()
                }
            }
        }
    }

    /// Splits registered addresses into first-seen ones (no state row yet)
    /// and active ones. Expired rows are final and left alone.
    async fn partition_addresses<F: Family>(
        &self,
    ) -> Result<(BTreeSet<Address>, BTreeSet<Address>), StoreError> {
        let registered: BTreeSet<Address> =
            F::registrations(&self.tables).keys().await?.into_iter().collect();
        let state = F::state_tables(&self.tables);
        let active: BTreeSet<Address> = state.active.keys().await?.into_iter().collect();
        let expired: BTreeSet<Address> = state.expired.keys().await?.into_iter().collect();

        let new = registered
            .iter()
            .filter(|address| !active.contains(*address) && !expired.contains(*address))
            .copied()
            .collect();
        let known = registered.intersection(&active).copied().collect();
        Ok((new, known))
    }

    async fn write_stats(&self, stats: &AppStats) {
        if let Err(err) = self
            .tables
            .app_stats
            .upsert(APP_STATS_KEY.to_string(), stats.clone())
            .await
        {
            tracing::error!(pass = stats.pass, error = %err, "failed to record app stats");
        }
    }
}

impl SyncPass for ContractsOrchestrator {
    fn run_pass(&self) -> BoxFuture<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.run().await?;
            Ok(())
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}
