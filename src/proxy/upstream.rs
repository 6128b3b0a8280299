//! SOCKS5 client dialer (RFC 1928/1929).
//!
//! Used by the server node to reach targets through a configured upstream
//! proxy instead of dialing them directly. Supports no-auth and
//! username/password authentication; the whole negotiation runs under one
//! deadline which is cleared once the proxied connection is live.

use std::net::IpAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::proxy::parse_address;

const VERSION: u8 = 0x05;
const AUTH_NONE: u8 = 0x00;
const AUTH_PASSWORD: u8 = 0x02;
const AUTH_NO_ACCEPTABLE: u8 = 0xFF;
const AUTH_SUBNEGOTIATION_VERSION: u8 = 0x01;
const CMD_CONNECT: u8 = 0x01;
const ATYP_IPV4: u8 = 0x01;
const ATYP_DOMAIN: u8 = 0x03;
const ATYP_IPV6: u8 = 0x04;
const REPLY_SUCCESS: u8 = 0x00;

/// Connect to `target` through the SOCKS5 proxy at `proxy`.
///
/// Empty credentials mean anonymous: only the no-auth method is offered.
/// Oversized hosts and out-of-range ports fail before any bytes go out.
pub async fn connect(
    proxy: &str,
    target: &str,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<TcpStream> {
    let (host, port) = parse_address(target)?;

    let secs = timeout.as_secs();
    let mut stream = tokio::time::timeout(timeout, TcpStream::connect(proxy))
        .await
        .map_err(|_| Error::Timeout(secs))??;

    tokio::time::timeout(
        timeout,
        negotiate(&mut stream, host, port, username, password),
    )
    .await
    .map_err(|_| Error::Timeout(secs))??;

    Ok(stream)
}

async fn negotiate(
    stream: &mut TcpStream,
    host: &str,
    port: u16,
    username: &str,
    password: &str,
) -> Result<()> {
    let method = negotiate_auth(stream, username, password).await?;
    if method == AUTH_PASSWORD {
        authenticate(stream, username, password).await?;
    }
    send_connect_request(stream, host, port).await
}

/// Method negotiation: offer no-auth, plus username/password when we have
/// credentials.
async fn negotiate_auth(
    stream: &mut TcpStream,
    username: &str,
    password: &str,
) -> Result<u8> {
    let mut methods = vec![AUTH_NONE];
    if !username.is_empty() || !password.is_empty() {
        methods.push(AUTH_PASSWORD);
    }

    let mut greeting = vec![VERSION, methods.len() as u8];
    greeting.extend_from_slice(&methods);
    stream.write_all(&greeting).await?;

    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != VERSION {
        return Err(Error::SocksParse(format!(
            "upstream sent version {:#04x}",
            choice[0]
        )));
    }
    if choice[1] == AUTH_NO_ACCEPTABLE {
        return Err(Error::NoAcceptableAuth);
    }
    Ok(choice[1])
}

/// RFC 1929 username/password sub-negotiation.
async fn authenticate(stream: &mut TcpStream, username: &str, password: &str) -> Result<()> {
    if username.len() > 255 || password.len() > 255 {
        return Err(Error::Config(
            "upstream username and password must each fit in 255 bytes".into(),
        ));
    }

    let mut request = vec![AUTH_SUBNEGOTIATION_VERSION, username.len() as u8];
    request.extend_from_slice(username.as_bytes());
    request.push(password.len() as u8);
    request.extend_from_slice(password.as_bytes());
    stream.write_all(&request).await?;

    let mut response = [0u8; 2];
    stream.read_exact(&mut response).await?;
    if response[0] != AUTH_SUBNEGOTIATION_VERSION || response[1] != 0x00 {
        return Err(Error::UpstreamAuthFailed(response[1]));
    }
    Ok(())
}

async fn send_connect_request(stream: &mut TcpStream, host: &str, port: u16) -> Result<()> {
    let mut request = vec![VERSION, CMD_CONNECT, 0x00];

    match host.parse::<IpAddr>() {
        Ok(IpAddr::V4(ip)) => {
            request.push(ATYP_IPV4);
            request.extend_from_slice(&ip.octets());
        }
        Ok(IpAddr::V6(ip)) => {
            request.push(ATYP_IPV6);
            request.extend_from_slice(&ip.octets());
        }
        Err(_) => {
            request.push(ATYP_DOMAIN);
            request.push(host.len() as u8);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    // Reply: VER REP RSV ATYP BND.ADDR BND.PORT
    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[0] != VERSION {
        return Err(Error::SocksParse(format!(
            "upstream sent version {:#04x}",
            reply[0]
        )));
    }
    if reply[1] != REPLY_SUCCESS {
        return Err(Error::UpstreamReply(reply[1]));
    }

    // We have no use for the bound address; skip it by type.
    let addr_len = match reply[3] {
        ATYP_IPV4 => 4,
        ATYP_IPV6 => 16,
        ATYP_DOMAIN => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            len[0] as usize
        }
        other => {
            return Err(Error::SocksParse(format!(
                "upstream sent address type {other:#04x}"
            )))
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(5);

    /// A scripted upstream: asserts what the dialer sends, replies from a
    /// canned transcript.
    async fn scripted_upstream(
        listener: TcpListener,
        expect_auth: bool,
        reply_code: u8,
    ) {
        let (mut conn, _) = listener.accept().await.unwrap();

        let mut head = [0u8; 2];
        conn.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], VERSION);
        let mut methods = vec![0u8; head[1] as usize];
        conn.read_exact(&mut methods).await.unwrap();
        assert!(methods.contains(&AUTH_NONE));

        if expect_auth {
            assert!(methods.contains(&AUTH_PASSWORD));
            conn.write_all(&[VERSION, AUTH_PASSWORD]).await.unwrap();

            let mut auth_head = [0u8; 2];
            conn.read_exact(&mut auth_head).await.unwrap();
            assert_eq!(auth_head[0], AUTH_SUBNEGOTIATION_VERSION);
            let mut username = vec![0u8; auth_head[1] as usize];
            conn.read_exact(&mut username).await.unwrap();
            assert_eq!(username, b"u");
            let mut plen = [0u8; 1];
            conn.read_exact(&mut plen).await.unwrap();
            let mut passwd = vec![0u8; plen[0] as usize];
            conn.read_exact(&mut passwd).await.unwrap();
            assert_eq!(passwd, b"p");
            conn.write_all(&[AUTH_SUBNEGOTIATION_VERSION, 0x00])
                .await
                .unwrap();
        } else {
            conn.write_all(&[VERSION, AUTH_NONE]).await.unwrap();
        }

        let mut req = [0u8; 4];
        conn.read_exact(&mut req).await.unwrap();
        assert_eq!([req[0], req[1], req[2]], [VERSION, CMD_CONNECT, 0x00]);
        match req[3] {
            ATYP_IPV4 => {
                let mut rest = [0u8; 6];
                conn.read_exact(&mut rest).await.unwrap();
            }
            ATYP_DOMAIN => {
                let mut len = [0u8; 1];
                conn.read_exact(&mut len).await.unwrap();
                let mut rest = vec![0u8; len[0] as usize + 2];
                conn.read_exact(&mut rest).await.unwrap();
            }
            ATYP_IPV6 => {
                let mut rest = [0u8; 18];
                conn.read_exact(&mut rest).await.unwrap();
            }
            other => panic!("unexpected ATYP {other}"),
        }

        conn.write_all(&[VERSION, reply_code, 0x00, ATYP_IPV4, 0, 0, 0, 0, 0, 0])
            .await
            .unwrap();

        if reply_code == REPLY_SUCCESS {
            // Prove the stream is live end to end.
            let mut probe = [0u8; 4];
            conn.read_exact(&mut probe).await.unwrap();
            conn.write_all(&probe).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_anonymous_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap().to_string();
        let upstream = tokio::spawn(scripted_upstream(listener, false, REPLY_SUCCESS));

        let mut stream = connect(&proxy_addr, "example.com:80", "", "", TIMEOUT)
            .await
            .unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut echo = [0u8; 4];
        stream.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"ping");
        upstream.await.unwrap();
    }

    #[tokio::test]
    async fn test_password_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap().to_string();
        let upstream = tokio::spawn(scripted_upstream(listener, true, REPLY_SUCCESS));

        let mut stream = connect(&proxy_addr, "10.1.2.3:443", "u", "p", TIMEOUT)
            .await
            .unwrap();

        stream.write_all(b"ping").await.unwrap();
        let mut echo = [0u8; 4];
        stream.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"ping");
        upstream.await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_refused_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(scripted_upstream(listener, false, 0x05));

        let result = connect(&proxy_addr, "example.com:80", "", "", TIMEOUT).await;
        assert!(matches!(result, Err(Error::UpstreamReply(0x05))));
    }

    #[tokio::test]
    async fn test_no_acceptable_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let proxy_addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut conn, _) = listener.accept().await.unwrap();
            let mut head = [0u8; 2];
            conn.read_exact(&mut head).await.unwrap();
            let mut methods = vec![0u8; head[1] as usize];
            conn.read_exact(&mut methods).await.unwrap();
            conn.write_all(&[VERSION, AUTH_NO_ACCEPTABLE]).await.unwrap();
        });

        let result = connect(&proxy_addr, "example.com:80", "", "", TIMEOUT).await;
        assert!(matches!(result, Err(Error::NoAcceptableAuth)));
    }

    #[tokio::test]
    async fn test_invalid_target_fails_before_dialing() {
        // The proxy address is never touched for a bad target.
        let result = connect(
            "127.0.0.1:1",
            &format!("{}:80", "h".repeat(300)),
            "",
            "",
            TIMEOUT,
        )
        .await;
        assert!(matches!(result, Err(Error::Address(_))));

        let result = connect("127.0.0.1:1", "example.com:0", "", "", TIMEOUT).await;
        assert!(matches!(result, Err(Error::Address(_))));
    }
}
