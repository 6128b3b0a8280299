//! veiltun local binary.
//!
//! Usage: veiltun-local -s <server:port> -k <password> [-c <config.json>] …
//!
//! Runs the SOCKS5 and HTTP CONNECT ingresses. With auto_proxy on it also
//! points the OS proxy settings at the HTTP ingress and restores them on
//! SIGINT/SIGTERM.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use veiltun::config::{LocalArgs, LocalConfig};
use veiltun::sysproxy;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match LocalConfig::resolve(LocalArgs::parse()) {
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
        "starting local proxy (socks5: {}, http: {}, server: {}, obfuscate: {})",
        config.local_addr,
        config.http_proxy_addr,
        config.server,
        config.obfuscate,
    );

    let snapshot = if config.auto_proxy {
        let snapshot = sysproxy::current();
        if let Err(e) = sysproxy::set_http_proxy(&config.http_proxy_addr) {
            tracing::warn!("system proxy setup failed: {e}");
        }
        Some(snapshot)
    } else {
        None
    };

    let exit_code = tokio::select! {
        res = veiltun::local::run(config) => {
            match res {
                Ok(()) => 0,
                Err(e) => {
                    tracing::error!("local proxy exited: {e}");
                    1
                }
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutting down");
            0
        }
    };

    if let Some(snapshot) = &snapshot {
        sysproxy::restore(snapshot);
    }
    std::process::exit(exit_code);
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
