use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinSet;

use valve_server::config::Config;
use valve_server::gateway;
use valve_server::metrics::Metrics;
use valve_server::transport::{Transport, http::HttpTransport};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse configuration from environment variables and CLI arguments
    let config = Config::from_env_and_args()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("valve={}", config.log_level).parse()?)
                .add_directive(format!("valve_server={}", config.log_level).parse()?),
        )
        .init();

    let handle = gateway::create_gateway(&config)?;
    let metrics = Arc::new(Metrics::new());

    let mut transport_tasks = JoinSet::new();

    if let Some(http_config) = &config.transports.http {
        let gateway_handle = handle.clone();
        let transport = HttpTransport::new(&http_config.host, http_config.port, metrics.clone())?;
        let host = http_config.host.clone();
        let port = http_config.port;

        transport_tasks.spawn(async move {
            tracing::info!("Starting HTTP transport on {}:{}", host, port);
            transport.start(gateway_handle).await
        });
    }

    tracing::info!(
        "Valve server started with {} startup policies",
        config.policies.len()
    );
    tracing::info!(
        "Store capacity: {}, Buffer size: {}",
        config.store.capacity,
        config.buffer_size
    );

    // Wait for all transport tasks to complete (they run indefinitely)
    while let Some(result) = transport_tasks.join_next().await {
        match result {
            Ok(Ok(())) => {
                tracing::info!("Transport task completed successfully");
            }
            Ok(Err(e)) => {
                tracing::error!("Transport task failed: {}", e);
                return Err(e);
            }
            Err(e) => {
                tracing::error!("Transport task panicked: {}", e);
                return Err(anyhow::anyhow!("Transport task panicked"));
            }
        }
    }

    Ok(())
}
