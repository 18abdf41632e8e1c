use anyhow::Result;
use contract_sync::{init_tracing, Runner, ServiceConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(config.debug());

    Runner::new(config).run_until_ctrl_c().await
}
