use crate::contracts::{CallBatcher, MulticallBatcher, SequentialBatcher};
use crate::rpc::{ChainClient, EthRpcClient};
use crate::runtime::config::ServiceConfig;
use crate::runtime::scheduler::Scheduler;
use crate::runtime::server;
use crate::runtime::telemetry::{spawn_metrics_reporter, Telemetry};
use crate::services::{system_clock, ContractsOrchestrator};
use crate::store::Tables;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handles to the background tasks of a started service.
pub struct RunningService {
    scheduler: Scheduler,
    tables: Tables,
    local_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl RunningService {
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    /// Address the HTTP trigger endpoint is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

/// Wires the RPC client, tables, orchestrator, scheduler, and HTTP endpoint,
/// and handles OS signals for graceful shutdowns.
pub struct Runner {
    config: ServiceConfig,
    shutdown: CancellationToken,
    running: Option<RunningService>,
}

impl Runner {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            shutdown: CancellationToken::new(),
            running: None,
        }
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn running(&self) -> Option<&RunningService> {
        self.running.as_ref()
    }

    /// Builds every component and spawns the ticker, metrics reporter, and HTTP server.
    pub async fn start(&mut self) -> Result<&RunningService> {
        if self.running.is_none() {
            let service = self.build().await?;
            self.running = Some(service);
        }
        self.running
            .as_ref()
            .context("service failed to start")
    }

    async fn build(&self) -> Result<RunningService> {
        let config = &self.config;
        let rpc = EthRpcClient::from_config(config)?;
        let client: Arc<dyn ChainClient> = Arc::new(rpc.clone());

        let network_id = match config.network_id() {
            Some(id) => id,
            None => rpc
                .chain_id()
                .await
                .context("failed to resolve network id from node")?,
        };

        let tables = match config.data_dir() {
            Some(dir) => Tables::open_dir(dir)
                .await
                .with_context(|| format!("failed to open tables under {}", dir.display()))?,
            None => {
                tracing::warn!("DATA_DIR not set; tables are kept in memory only");
                Tables::in_memory()
            }
        };

        let batcher: Arc<dyn CallBatcher> = match config.multicall_address() {
            Some(multicall) => Arc::new(MulticallBatcher::new(client.clone(), multicall)),
            None => {
                tracing::warn!("no Multicall2 address configured; reads fall back to one eth_call each");
                Arc::new(SequentialBatcher::new(client.clone()))
            }
        };

        let telemetry = Arc::new(Telemetry::default());
        let orchestrator = Arc::new(ContractsOrchestrator::new(
            client,
            batcher,
            tables.clone(),
            config.sync_settings(network_id),
            telemetry.clone(),
            system_clock(),
        ));
        let scheduler = Scheduler::new(orchestrator, telemetry.clone());

        let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.http_port())))
            .await
            .with_context(|| format!("failed to bind http port {}", config.http_port()))?;
        let local_addr = listener.local_addr()?;

        let mut tasks = Vec::new();
        let server_scheduler = scheduler.clone();
        let server_shutdown = self.shutdown.clone();
        tasks.push(tokio::spawn(async move {
            if let Err(err) = server::serve(listener, server_scheduler, server_shutdown.clone()).await {
                tracing::error!(error = %format!("{err:#}"), "http server stopped");
                server_shutdown.cancel();
            }
        }));
        tasks.push(scheduler.spawn_ticker(config.scheduler_interval(), self.shutdown.clone()));
        tasks.push(spawn_metrics_reporter(
            telemetry,
            Some(rpc),
            self.shutdown.clone(),
            config.metrics_interval(),
        ));

        tracing::info!(
            network_id,
            %local_addr,
            interval_secs = config.scheduler_interval().as_secs(),
            creators = config.creator_addresses().len(),
            "contract sync service started"
        );

        Ok(RunningService {
            scheduler,
            tables,
            local_addr,
            tasks,
        })
    }

    /// Cancels the root token and waits for background tasks and any running pass.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(service) = self.running.take() else {
            return Ok(());
        };

        self.shutdown.cancel();
        for task in service.tasks {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "background task ended abnormally");
            }
        }
        service.scheduler.wait_idle().await;
        self.shutdown = CancellationToken::new();
        tracing::info!("contract sync service stopped");
        Ok(())
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }
}
