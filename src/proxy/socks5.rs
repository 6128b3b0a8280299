//! SOCKS5 ingress.
//!
//! RFC 1928 server side, CONNECT only, no authentication. Parses the
//! greeting and request from a local client and produces the `"host:port"`
//! string the tunnel carries; the caller replies success only once the
//! tunnel is fully established.

use std::net::{Ipv4Addr, Ipv6Addr};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{Error, Result};

const VERSION: u8 = 0x05;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;

const REPLY_SUCCESS: [u8; 10] = [0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
const REPLY_FAILURE: [u8; 10] = [0x05, 0x01, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
const REPLY_CMD_UNSUPPORTED: [u8; 10] = [0x05, 0x07, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
const REPLY_ATYP_UNSUPPORTED: [u8; 10] = [0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0];
const REPLY_NO_METHOD: [u8; 2] = [0x05, 0xFF];

/// Parse the greeting and CONNECT request. Returns the target as
/// `"host:port"`. Protocol violations are answered on the spot before the
/// error is returned.
pub async fn read_request<S>(client: &mut S) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // Greeting: VER NMETHODS METHODS…
    let mut head = [0u8; 2];
    client.read_exact(&mut head).await?;
    if head[0] != VERSION {
        client.write_all(&REPLY_NO_METHOD).await?;
        return Err(Error::SocksParse(format!(
            "unsupported version {:#04x}",
            head[0]
        )));
    }
    let mut methods = vec![0u8; head[1] as usize];
    client.read_exact(&mut methods).await?;
    client.write_all(&[VERSION, 0x00]).await?;

    // Request: VER CMD RSV ATYP
    let mut request = [0u8; 4];
    client.read_exact(&mut request).await?;
    if request[1] != CMD_CONNECT {
        client.write_all(&REPLY_CMD_UNSUPPORTED).await?;
        return Err(Error::SocksParse(format!(
            "unsupported command {:#04x}",
            request[1]
        )));
    }

    let host = match request[3] {
        ATYP_IPV4 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await?;
            Ipv4Addr::from(ip).to_string()
        }
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            client.read_exact(&mut len).await?;
            let mut name = vec![0u8; len[0] as usize];
            client.read_exact(&mut name).await?;
            String::from_utf8(name)
                .map_err(|_| Error::SocksParse("domain is not valid UTF-8".into()))?
        }
        ATYP_IPV6 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await?;
            Ipv6Addr::from(ip).to_string()
        }
        other => {
            client.write_all(&REPLY_ATYP_UNSUPPORTED).await?;
            return Err(Error::SocksParse(format!(
                "unsupported address type {other:#04x}"
            )));
        }
    };

    let mut port = [0u8; 2];
    client.read_exact(&mut port).await?;

    Ok(format!("{host}:{}", u16::from_be_bytes(port)))
}

/// Tell the client the tunnel is up.
pub async fn reply_success<S>(client: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    client.write_all(&REPLY_SUCCESS).await?;
    Ok(())
}

/// Tell the client the tunnel could not be established. Best effort: the
/// client may already be gone.
pub async fn reply_failure<S>(client: &mut S)
where
    S: AsyncWrite + Unpin,
{
    let _ = client.write_all(&REPLY_FAILURE).await;
}
