use std::sync::Arc;

use crate::support::{
    helpers::{clock_at, contracts, init_tracing, service_config},
    mock_node::{contract, MockNode, MockNodeServer, COLLATERAL, LONG, MULTICALL},
};
use anyhow::Result;
use contract_sync::contracts::ContractPhase;
use contract_sync::store::Partition;
use contract_sync::{
    CallBatcher, ChainClient, ContractsOrchestrator, EthRpcClient, MulticallBatcher,
    SequentialBatcher, Tables, Telemetry,
};

const NOW: i64 = 1_700_000_000;
const FAR_FUTURE: u64 = 4_000_000_000;

fn orchestrator(
    url: &str,
    tables: &Tables,
    multicall: bool,
) -> Result<ContractsOrchestrator> {
    let client: Arc<dyn ChainClient> = Arc::new(EthRpcClient::new(url, None)?);
    let batcher: Arc<dyn CallBatcher> = if multicall {
        Arc::new(MulticallBatcher::new(client.clone(), MULTICALL))
    } else {
        Arc::new(SequentialBatcher::new(client.clone()))
    };
    Ok(ContractsOrchestrator::new(
        client,
        batcher,
        tables.clone(),
        service_config(url).sync_settings(1),
        Arc::new(Telemetry::default()),
        clock_at(NOW),
    ))
}

/// Two live EMPs, one EMP past its expiration, and one live LSP.
fn seeded_node() -> MockNode {
    let node = MockNode::new(120);
    node.register_emp(contract(1), 10, FAR_FUTURE);
    node.register_emp(contract(2), 55, FAR_FUTURE);
    node.register_emp(contract(3), 90, 1_600_000_000);
    node.create_lsp(contract(11), 70, FAR_FUTURE);
    node
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pass_over_json_rpc_populates_every_table() -> Result<()> {
    init_tracing();
    let node = seeded_node();
    let server = MockNodeServer::start(node.clone()).await?;
    let tables = Tables::in_memory();

    let summary = orchestrator(server.url(), &tables, true)?.run().await?;

    assert_eq!(summary.stats.addresses_processed, 4);
    assert_eq!(summary.stats.failures, 0);
    assert_eq!(tables.emps.active.keys().await?, contracts(&[1, 2]));
    assert_eq!(tables.emps.expired.keys().await?, contracts(&[3]));
    assert_eq!(tables.lsps.active.keys().await?, contracts(&[11]));

    let row = tables.emps.active.get(&contract(1)).await?.expect("active row");
    assert_eq!(row.partition, Partition::Active);
    assert_eq!(row.last_updated_block, 120);
    assert_eq!(row.fields.contract_state, ContractPhase::Open);
    assert_eq!(row.fields.price_identifier, "ETH/USD");

    let lsp = tables.lsps.active.get(&contract(11)).await?.expect("lsp row");
    assert_eq!(lsp.fields.long_token, LONG);
    assert_eq!(lsp.fields.pair_name, "UMA Pair");

    let collateral = tables.erc20s.get(&COLLATERAL).await?.expect("collateral metadata");
    assert_eq!(collateral.symbol.as_deref(), Some("WETH"));
    assert!(tables.long_addresses.has(&LONG).await?);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sequential_fallback_writes_the_same_rows() -> Result<()> {
    init_tracing();
    let node = seeded_node();
    let server = MockNodeServer::start(node.clone()).await?;

    let batched = Tables::in_memory();
    orchestrator(server.url(), &batched, true)?.run().await?;
    let batched_calls = node.eth_calls();

    let sequential = Tables::in_memory();
    orchestrator(server.url(), &sequential, false)?.run().await?;
    let sequential_calls = node.eth_calls() - batched_calls;

    assert_eq!(
        batched.emps.active.query(&|_, _| true).await?,
        sequential.emps.active.query(&|_, _| true).await?
    );
    assert_eq!(
        batched.lsps.active.query(&|_, _| true).await?,
        sequential.lsps.active.query(&|_, _| true).await?
    );
    assert!(sequential_calls > batched_calls);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_contract_recovers_on_the_next_pass() -> Result<()> {
    init_tracing();
    let node = seeded_node();
    node.fail_address(contract(2));
    let server = MockNodeServer::start(node.clone()).await?;
    let tables = Tables::in_memory();
    let orchestrator = orchestrator(server.url(), &tables, true)?;

    let first = orchestrator.run().await?;
    assert_eq!(first.stats.failures, 1);
    assert_eq!(first.stats.failed_addresses, contracts(&[2]));
    assert_eq!(tables.emps.active.keys().await?, contracts(&[1]));

    node.restore_address(contract(2));
    node.set_contract_state(contract(1), 1);
    let second = orchestrator.run().await?;
    assert_eq!(second.stats.failures, 0);
    assert_eq!(tables.emps.active.keys().await?, contracts(&[2]));
    assert_eq!(tables.emps.expired.keys().await?, contracts(&[1, 3]));

    // Release pooled keep-alive connections so graceful shutdown can complete.
    drop(orchestrator);
    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_tables_survive_a_restart() -> Result<()> {
    init_tracing();
    let node = seeded_node();
    let server = MockNodeServer::start(node.clone()).await?;
    let dir = tempfile::tempdir()?;

    {
        let tables = Tables::open_dir(dir.path()).await?;
        orchestrator(server.url(), &tables, true)?.run().await?;
    }

    node.register_emp(contract(4), 130, FAR_FUTURE);
    node.set_head(140);

    let reopened = Tables::open_dir(dir.path()).await?;
    assert_eq!(reopened.emps.active.keys().await?, contracts(&[1, 2]));

    let summary = orchestrator(server.url(), &reopened, true)?.run().await?;
    assert_eq!(summary.emp.discovered, Some(1));
    assert_eq!(summary.emp.new_addresses, 1);
    assert_eq!(reopened.registered_emps.keys().await?, contracts(&[1, 2, 3, 4]));
    assert_eq!(reopened.emps.active.keys().await?, contracts(&[1, 2, 4]));

    server.shutdown().await;
    Ok(())
}
