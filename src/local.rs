//! Local node.
//!
//! Listens on the SOCKS5 and HTTP-CONNECT ingress addresses, and for every
//! accepted client walks the session pipeline: parse the ingress request,
//! dial the server, handshake, derive the session key, exchange the target
//! address, then relay. Every pre-relay phase runs under the configured
//! deadline; the relay itself runs without one.

use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::config::LocalConfig;
use crate::crypto;
use crate::deadline;
use crate::error::{Error, Result};
use crate::protocol::{addr, handshake, SecureReader, SecureWriter};
use crate::proxy::{http, socks5};
use crate::relay;

/// Bind both ingress listeners and serve until the process is stopped.
pub async fn run(config: LocalConfig) -> Result<()> {
    let config = Arc::new(config);

    let socks_listener = TcpListener::bind(&config.local_addr).await?;
    tracing::info!("SOCKS5 ingress listening on {}", config.local_addr);

    let http_listener = TcpListener::bind(&config.http_proxy_addr).await?;
    tracing::info!("HTTP CONNECT ingress listening on {}", config.http_proxy_addr);

    tokio::select! {
        res = serve_socks5(socks_listener, Arc::clone(&config)) => res,
        res = serve_http(http_listener, config) => res,
    }
}

/// Accept loop for the SOCKS5 ingress.
pub async fn serve_socks5(listener: TcpListener, config: Arc<LocalConfig>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    match handle_socks5(client, &config).await {
                        Err(e @ Error::SocksParse(_)) => {
                            tracing::warn!("SOCKS5 session from {peer}: {e}");
                        }
                        Err(e) => tracing::debug!("SOCKS5 session from {peer} ended: {e}"),
                        Ok(()) => {}
                    }
                });
            }
            Err(e) => tracing::warn!("SOCKS5 accept error: {e}"),
        }
    }
}

/// Accept loop for the HTTP CONNECT ingress.
pub async fn serve_http(listener: TcpListener, config: Arc<LocalConfig>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((client, peer)) => {
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    match handle_http(client, &config).await {
                        Err(e @ Error::HttpParse(_)) => {
                            tracing::warn!("HTTP session from {peer}: {e}");
                        }
                        Err(e) => tracing::debug!("HTTP session from {peer} ended: {e}"),
                        Ok(()) => {}
                    }
                });
            }
            Err(e) => tracing::warn!("HTTP accept error: {e}"),
        }
    }
}

async fn handle_socks5(mut client: TcpStream, config: &LocalConfig) -> Result<()> {
    let target = deadline(config.timeout_secs, socks5::read_request(&mut client)).await?;
    tracing::info!("SOCKS5 request for {target}");

    let (reader, writer) = match open_tunnel(config, &target).await {
        Ok(pair) => pair,
        Err(e) => {
            socks5::reply_failure(&mut client).await;
            return Err(e);
        }
    };

    socks5::reply_success(&mut client).await?;
    finish_session(&target, relay::splice(client, reader, writer).await);
    Ok(())
}

async fn handle_http(client: TcpStream, config: &LocalConfig) -> Result<()> {
    let mut client = BufReader::new(client);

    let target = match deadline(config.timeout_secs, http::read_request(&mut client)).await {
        Ok(target) => target,
        Err(e) => {
            match e {
                Error::HttpParse(_) => http::reply_error(&mut client, 400, "Bad Request").await,
                _ => http::reply_error(&mut client, 502, "Bad Gateway").await,
            }
            return Err(e);
        }
    };
    tracing::info!("HTTP CONNECT request for {target}");

    let (reader, writer) = match open_tunnel(config, &target).await {
        Ok(pair) => pair,
        Err(e) => {
            http::reply_error(&mut client, 502, "Bad Gateway").await;
            return Err(e);
        }
    };

    http::reply_established(&mut client).await?;
    finish_session(&target, relay::splice(client, reader, writer).await);
    Ok(())
}

fn finish_session(target: &str, result: Result<()>) {
    match result {
        Err(e) if !e.is_disconnect() => tracing::debug!("relay for {target} ended: {e}"),
        _ => tracing::debug!("session for {target} closed"),
    }
}

/// Dial the server and run handshake, key setup, and the address exchange.
async fn open_tunnel(
    config: &LocalConfig,
    target: &str,
) -> Result<(SecureReader<OwnedReadHalf>, SecureWriter<OwnedWriteHalf>)> {
    let secs = config.timeout_secs;

    let mut server = deadline(secs, async {
        Ok(TcpStream::connect(&config.server).await?)
    })
    .await?;
    server.set_nodelay(true)?;

    let salt = deadline(secs, handshake::client(&mut server, &config.password)).await?;
    tracing::debug!("handshake with {} complete", config.server);

    // The memory-hard KDF would stall the reactor; push it to a blocking
    // thread and await the result under the phase deadline.
    let password = config.password.clone();
    let key = deadline(secs, async move {
        tokio::task::spawn_blocking(move || crypto::derive_key(&password, &salt))
            .await
            .map_err(|_| Error::KeyDerivation)?
    })
    .await?;

    let (read_half, write_half) = server.into_split();
    let mut reader = SecureReader::new(read_half, &key, config.obfuscate);
    let mut writer = SecureWriter::new(write_half, &key, config.obfuscate);

    deadline(secs, async {
        addr::send_target(&mut writer, target).await?;
        let status = addr::recv_status(&mut reader).await?;
        if status != addr::STATUS_OK {
            return Err(Error::TargetUnreachable(status));
        }
        Ok(())
    })
    .await?;

    Ok((reader, writer))
}
