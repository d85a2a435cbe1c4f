use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use can_node::api::{create_router, ApiState};
use can_node::config::Config;
use can_node::node::CanNode;
use can_node::region::Host;
use can_node::wire;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    if config.dimension < 1 {
        return Err("--dimension must be at least 1".into());
    }
    if config.redundancy < 1 {
        return Err("--redundancy must be at least 1".into());
    }
    let self_host = Host::new("localhost", config.port);
    let node = Arc::new(CanNode::new(config.dimension, config.redundancy, self_host));

    if let Some(bootstrap) = &config.join {
        let bootstrap = wire::parse_host(bootstrap)
            .ok_or_else(|| format!("--join must be host:port, got {}", bootstrap))?;

        let mut key = String::new();
        std::io::stdin().lock().read_line(&mut key)?;
        let key = key.trim();

        tracing::info!(%bootstrap, %key, "joining overlay");
        node.join_via(bootstrap, key).await?;
    }

    let state = ApiState { node };
    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "starting can-node");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
