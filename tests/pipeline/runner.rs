use std::time::Duration;

use crate::support::{
    helpers::{contracts, init_tracing, wait_until},
    mock_node::{contract, MockNode, MockNodeServer, CREATOR, MULTICALL, REGISTRY},
};
use anyhow::{Context, Result};
use contract_sync::{Runner, SchedulerState, ServiceConfig};
use hyper::{Body, Client, Method, Request, StatusCode};
use serde_json::Value;
use tokio::time::timeout;

fn runner_config(url: &str) -> Result<ServiceConfig> {
    Ok(ServiceConfig::builder()
        .rpc_url(url)
        .registry_address(REGISTRY)
        .creator_addresses(vec![CREATOR])
        .multicall_address(MULTICALL)
        .http_port(0)
        .scheduler_interval(Duration::from_secs(3_600))
        .build()?)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn http_trigger_runs_a_follow_up_pass() -> Result<()> {
    init_tracing();
    let node = MockNode::new(50);
    node.register_emp(contract(1), 5, 4_000_000_000);
    node.create_lsp(contract(11), 6, 4_000_000_000);
    let server = MockNodeServer::start(node.clone()).await?;

    let mut runner = Runner::new(runner_config(server.url())?);
    let (scheduler, tables, port) = {
        let service = runner.start().await?;
        (
            service.scheduler().clone(),
            service.tables().clone(),
            service.local_addr().port(),
        )
    };

    // The ticker fires immediately; the HTTP trigger adds exactly one more pass.
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://127.0.0.1:{port}/scheduler"))
        .body(Body::empty())?;
    let response = Client::new().request(request).await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = hyper::body::to_bytes(response.into_body()).await?;
    let json: Value = serde_json::from_slice(&body)?;
    assert_eq!(json["accepted"], true);
    assert!(matches!(json["outcome"].as_str(), Some("started" | "queued")));

    wait_until(Duration::from_secs(10), || {
        let scheduler = scheduler.clone();
        async move { scheduler.runs() >= 2 && scheduler.state() == SchedulerState::Idle }
    })
    .await
    .context("both passes should complete")?;

    assert_eq!(scheduler.runs(), 2);
    assert_eq!(scheduler.failed_runs(), 0);
    assert_eq!(tables.emps.active.keys().await?, contracts(&[1]));
    assert_eq!(tables.lsps.active.keys().await?, contracts(&[11]));

    timeout(Duration::from_secs(5), runner.stop())
        .await
        .context("runner should stop")??;
    assert!(runner.running().is_none());

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_the_root_token_stops_the_runner() -> Result<()> {
    init_tracing();
    let node = MockNode::new(10);
    let server = MockNodeServer::start(node).await?;

    let mut runner = Runner::new(runner_config(server.url())?);
    let token = runner.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        token.cancel();
    });

    timeout(Duration::from_secs(5), runner.run_until_ctrl_c())
        .await
        .context("runner should observe cancellation")??;

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn unreachable_node_fails_startup() -> Result<()> {
    init_tracing();
    let config = ServiceConfig::builder()
        .rpc_url("http://127.0.0.1:9")
        .registry_address(REGISTRY)
        .creator_addresses(vec![CREATOR])
        .http_port(0)
        .build()?;

    let mut runner = Runner::new(config);
    let err = runner
        .start()
        .await
        .err()
        .context("start should fail without a network id")?;
    assert!(format!("{err:#}").contains("network id"));
    assert!(runner.running().is_none());
    Ok(())
}
