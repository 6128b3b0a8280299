//! Target address exchange.
//!
//! The first encrypted unit from local to server names the destination:
//! `len_u8 ‖ addr_utf8[len]` where `addr` is `"host:port"` and `len ≤ 255`.
//! The length and the address travel as two records; receivers also accept
//! them combined in one. The server answers with a single status record
//! before any other server-to-local record may flow.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::{Error, Result};
use crate::protocol::{SecureReader, SecureWriter};
use crate::MAX_RECORD_SIZE;

/// Target reached; relay follows.
pub const STATUS_OK: u8 = 0x00;

/// Target dial failed.
pub const STATUS_UNREACHABLE: u8 = 0x01;

/// Largest address the one-byte length prefix can describe.
pub const MAX_ADDR_LEN: usize = 255;

/// Send the target address.
pub async fn send_target<W>(writer: &mut SecureWriter<W>, target: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if target.is_empty() || target.len() > MAX_ADDR_LEN {
        return Err(Error::Address(format!(
            "length {} outside [1, {MAX_ADDR_LEN}]",
            target.len()
        )));
    }

    writer.write(&[target.len() as u8]).await?;
    writer.write(target.as_bytes()).await
}

/// Receive the target address, tolerating split or combined records.
pub async fn recv_target<R>(reader: &mut SecureReader<R>) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_RECORD_SIZE];

    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(Error::ShortRead);
    }
    let len = buf[0] as usize;
    if len == 0 {
        return Err(Error::Address("empty target".into()));
    }

    let mut addr = Vec::with_capacity(len);
    addr.extend_from_slice(&buf[1..n.min(1 + len)]);
    while addr.len() < len {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Err(Error::ShortRead);
        }
        let take = (len - addr.len()).min(n);
        addr.extend_from_slice(&buf[..take]);
    }

    String::from_utf8(addr).map_err(|_| Error::Address("not valid UTF-8".into()))
}

/// Send the dial verdict.
pub async fn send_status<W>(writer: &mut SecureWriter<W>, status: u8) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write(&[status]).await
}

/// Receive the dial verdict.
pub async fn recv_status<R>(reader: &mut SecureReader<R>) -> Result<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; MAX_RECORD_SIZE];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Err(Error::ShortRead);
    }
    Ok(buf[0])
}
