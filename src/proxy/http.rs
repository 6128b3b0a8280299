//! HTTP CONNECT ingress.
//!
//! Accepts `CONNECT host:port HTTP/1.x` from a local client, discards the
//! headers, and yields the target. Only CONNECT is supported; a request the
//! parser cannot make sense of gets `400 Bad Request`, any later tunnel
//! failure gets `502 Bad Gateway`.

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::{Error, Result};
use crate::proxy::parse_address;

/// Read the request line and headers. Returns the target as `"host:port"`.
///
/// The caller keeps the `BufReader` for the relay phase so that any bytes
/// the client pipelined behind the headers are not lost.
pub async fn read_request<S>(client: &mut BufReader<S>) -> Result<String>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut request_line = String::new();
    client.read_line(&mut request_line).await?;
    let target = parse_connect_line(&request_line)?;

    // Discard headers up to the blank line.
    loop {
        let mut header = String::new();
        let n = client.read_line(&mut header).await?;
        if n == 0 {
            return Err(Error::HttpParse("connection closed inside headers".into()));
        }
        if header == "\r\n" || header == "\n" {
            break;
        }
    }

    Ok(target)
}

fn parse_connect_line(line: &str) -> Result<String> {
    let mut parts = line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| Error::HttpParse("empty request line".into()))?;
    if !method.eq_ignore_ascii_case("CONNECT") {
        return Err(Error::HttpParse(format!("unsupported method {method}")));
    }
    let target = parts
        .next()
        .ok_or_else(|| Error::HttpParse("missing target".into()))?;
    parse_address(target).map_err(|e| Error::HttpParse(e.to_string()))?;
    Ok(target.to_string())
}

/// Tell the client the tunnel is up.
pub async fn reply_established<S>(client: &mut S) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    client
        .write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n")
        .await?;
    Ok(())
}

/// Send an error response. Best effort: the client may already be gone.
pub async fn reply_error<S>(client: &mut S, status: u16, reason: &str)
where
    S: AsyncWrite + Unpin,
{
    let response = format!("HTTP/1.1 {status} {reason}\r\nContent-Length: 0\r\n\r\n");
    let _ = client.write_all(response.as_bytes()).await;
}
