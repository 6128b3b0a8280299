//! Bidirectional relay between an established plaintext stream and the
//! encrypted tunnel.
//!
//! Runs the two copy directions concurrently and returns as soon as either
//! one finishes; dropping the session afterwards closes both sockets, which
//! unblocks whatever the other direction was waiting on. EOF is normal
//! termination, not an error.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::protocol::{SecureReader, SecureWriter};
use crate::{Error, Result, MAX_RECORD_SIZE};

/// Plaintext chunk size fed into the record layer. Well under the record
/// payload maximum; one read becomes one record.
const COPY_CHUNK: usize = 16 * 1024;

/// Splice `plain` and the encrypted pair until either direction ends.
pub async fn splice<S, R, W>(
    plain: S,
    mut from_tunnel: SecureReader<R>,
    mut to_tunnel: SecureWriter<W>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let (mut plain_rd, mut plain_wr) = tokio::io::split(plain);

    let outbound = async {
        let mut buf = vec![0u8; COPY_CHUNK];
        loop {
            let n = plain_rd.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            to_tunnel.write(&buf[..n]).await?;
        }
        Ok::<_, Error>(())
    };

    let inbound = async {
        // Sized for a worst-case record; smaller would be a hard error.
        let mut buf = vec![0u8; MAX_RECORD_SIZE];
        loop {
            let n = from_tunnel.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            plain_wr.write_all(&buf[..n]).await?;
        }
        Ok::<_, Error>(())
    };

    tokio::select! {
        res = outbound => res,
        res = inbound => res,
    }
}
