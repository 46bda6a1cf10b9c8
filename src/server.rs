use anyhow::{Context, Result};
use tonic::transport::Server;
use tracing::info;

use table_lake::{logging, Config, TableService};

#[tokio::main]
async fn main() -> Result<()> {
    logging::register_logger();

    let config = Config::load().context("failed to load config")?;
    for storage in config.storages() {
        storage
            .create_root()
            .with_context(|| format!("failed to create {}", storage.root.display()))?;
    }

    let service = TableService::from_config(&config)?;
    info!(addr = %config.addr, "server started");
    Server::builder()
        .concurrency_limit_per_connection(config.concurrency_limit_per_connection)
        .add_service(service.into_server())
        .serve(config.addr)
        .await?;

    Ok(())
}
