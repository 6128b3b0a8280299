//! Server node.
//!
//! Accepts tunnel connections from local nodes. Each session: verify the
//! handshake, derive the session key, read the target address, dial the
//! target (directly or through the configured upstream SOCKS5 proxy), send
//! the status byte, then relay until either side hangs up.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;
use crate::crypto;
use crate::deadline;
use crate::error::{Error, Result};
use crate::protocol::{addr, handshake, SecureReader, SecureWriter};
use crate::proxy::{self, upstream};
use crate::relay;

/// Bind the tunnel listener and serve until the process is stopped.
pub async fn run(config: ServerConfig) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!("server listening on 0.0.0.0:{}", config.port);
    serve(listener, Arc::new(config)).await
}

/// Accept loop over an already-bound listener.
pub async fn serve(listener: TcpListener, config: Arc<ServerConfig>) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, peer, &config).await {
                        if e.is_auth_failure() {
                            tracing::warn!("rejected connection from {peer}: {e}");
                        } else {
                            tracing::debug!("session from {peer} ended: {e}");
                        }
                    }
                });
            }
            Err(e) => tracing::warn!("accept error: {e}"),
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    config: &ServerConfig,
) -> Result<()> {
    stream.set_nodelay(true)?;
    let secs = config.timeout_secs;

    let salt = deadline(secs, handshake::server(&mut stream, &config.password)).await?;
    tracing::debug!("handshake with {peer} complete");

    let password = config.password.clone();
    let key = deadline(secs, async move {
        tokio::task::spawn_blocking(move || crypto::derive_key(&password, &salt))
            .await
            .map_err(|_| Error::KeyDerivation)?
    })
    .await?;

    let (read_half, write_half) = stream.into_split();
    let mut reader = SecureReader::new(read_half, &key, config.obfuscate);
    let mut writer = SecureWriter::new(write_half, &key, config.obfuscate);

    let target = deadline(secs, addr::recv_target(&mut reader)).await?;
    tracing::info!("connecting to {target} for {peer}");

    let target_stream = match dial_target(config, &target).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!("could not reach {target}: {e}");
            addr::send_status(&mut writer, addr::STATUS_UNREACHABLE).await?;
            return Err(e);
        }
    };
    addr::send_status(&mut writer, addr::STATUS_OK).await?;

    match relay::splice(target_stream, reader, writer).await {
        Err(e) if !e.is_disconnect() => tracing::debug!("relay for {target} ended: {e}"),
        _ => tracing::debug!("session for {target} closed"),
    }
    Ok(())
}

/// Dial the target, through the upstream proxy when one is configured.
async fn dial_target(config: &ServerConfig, target: &str) -> Result<TcpStream> {
    if let Some(proxy_addr) = &config.upstream_proxy {
        tracing::debug!("dialing {target} via upstream {proxy_addr}");
        return upstream::connect(
            proxy_addr,
            target,
            config.upstream_username.as_deref().unwrap_or(""),
            config.upstream_password.as_deref().unwrap_or(""),
            config.timeout(),
        )
        .await;
    }

    let (host, port) = proxy::parse_address(target)?;
    let stream = deadline(config.timeout_secs, async {
        Ok(TcpStream::connect((host, port)).await?)
    })
    .await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}
