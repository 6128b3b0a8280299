//! veiltun server binary.
//!
//! Usage: veiltun-server -k <password> [-p <port>] [-c <config.json>] …

use clap::Parser;
use tracing_subscriber::EnvFilter;

use veiltun::config::{ServerArgs, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match ServerConfig::resolve(ServerArgs::parse()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with_target(false)
        .init();

    tracing::info!(
        "starting server on port {} (obfuscate: {}, upstream: {})",
        config.port,
        config.obfuscate,
        config.upstream_proxy.as_deref().unwrap_or("none"),
    );

    if let Err(e) = veiltun::server::run(config).await {
        tracing::error!("server exited: {e}");
        std::process::exit(1);
    }

    Ok(())
}
