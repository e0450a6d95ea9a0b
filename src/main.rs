use anyhow::Result;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tandem::config::Config;
use tandem::http;
use tandem::signaling::SignalingServer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting tandem v{}", env!("CARGO_PKG_VERSION"));

    let server = SignalingServer::new(config.translation_client()?)
        .with_ping_interval(config.ping_interval());
    let http_listener = TcpListener::bind(config.http_addr()).await?;
    let signaling_addr = config.signaling_addr();

    tokio::select! {
        res = server.run(&signaling_addr) => res?,
        res = http::serve(http_listener, server.handle()) => res?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
