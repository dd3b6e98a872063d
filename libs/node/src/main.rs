use anyhow::Context;
use tracing::info;
use warren_node::{AppConfig, Application};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("loading configuration")?;
    let app = Application::start(config).await.context("starting application")?;

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("shutdown requested");
    app.shutdown().await;
    Ok(())
}
