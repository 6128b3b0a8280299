//! Connection authentication.
//!
//! The first 72 bytes on every tunnel connection, sent in cleartext:
//!
//! ```text
//! salt[32] ‖ timestamp_be64[8] ‖ HMAC-SHA256(password, salt ‖ timestamp)[32]
//! ```
//!
//! The server replies with a single verdict byte (`0x00` accept, `0x01`
//! reject). The salt doubles as the Argon2id salt for key derivation, so a
//! fresh key falls out of the exchange without an extra round trip; the
//! timestamp bounds replay of a captured message to a 30-second window.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{SecureRandom, SALT_SIZE};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Size of the timestamp field in bytes
pub const TIMESTAMP_SIZE: usize = 8;

/// Size of the MAC field in bytes
pub const MAC_SIZE: usize = 32;

/// Total handshake message size in bytes
pub const HANDSHAKE_SIZE: usize = SALT_SIZE + TIMESTAMP_SIZE + MAC_SIZE;

/// Largest tolerated clock difference between the two nodes, in seconds.
///
/// The comparison is on the absolute difference, so a client running
/// *behind* the server by up to this much is accepted too.
pub const MAX_CLOCK_SKEW_SECS: i64 = 30;

const ACCEPT: u8 = 0x00;
const REJECT: u8 = 0x01;

fn message_mac(password: &str, salt: &[u8], timestamp: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(password.as_bytes()).expect("HMAC accepts any key length");
    mac.update(salt);
    mac.update(timestamp);
    mac
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before the epoch")
        .as_secs()
}

/// Client side: send the authentication message, await the verdict.
///
/// Returns the salt for key derivation.
pub async fn client<S>(stream: &mut S, password: &str) -> Result<[u8; SALT_SIZE]>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let salt: [u8; SALT_SIZE] = SecureRandom::bytes();
    let timestamp = unix_now().to_be_bytes();
    let mac = message_mac(password, &salt, &timestamp).finalize().into_bytes();

    let mut message = [0u8; HANDSHAKE_SIZE];
    message[..SALT_SIZE].copy_from_slice(&salt);
    message[SALT_SIZE..SALT_SIZE + TIMESTAMP_SIZE].copy_from_slice(&timestamp);
    message[SALT_SIZE + TIMESTAMP_SIZE..].copy_from_slice(&mac);
    stream.write_all(&message).await?;

    let mut verdict = [0u8; 1];
    stream.read_exact(&mut verdict).await?;
    if verdict[0] != ACCEPT {
        return Err(Error::AuthRejected);
    }

    Ok(salt)
}

/// Server side: read and verify the authentication message.
///
/// Emits the verdict byte in every case. Returns the salt for key
/// derivation on success.
pub async fn server<S>(stream: &mut S, password: &str) -> Result<[u8; SALT_SIZE]>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut message = [0u8; HANDSHAKE_SIZE];
    stream.read_exact(&mut message).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::ShortRead
        } else {
            Error::Io(e)
        }
    })?;

    let mut salt = [0u8; SALT_SIZE];
    salt.copy_from_slice(&message[..SALT_SIZE]);
    let timestamp = &message[SALT_SIZE..SALT_SIZE + TIMESTAMP_SIZE];
    let received_mac = &message[SALT_SIZE + TIMESTAMP_SIZE..];

    let sent = u64::from_be_bytes(timestamp.try_into().expect("timestamp field is 8 bytes"));
    let skew = unix_now() as i64 - sent as i64;
    if skew.abs() > MAX_CLOCK_SKEW_SECS {
        stream.write_all(&[REJECT]).await?;
        return Err(Error::StaleHandshake(skew));
    }

    // verify_slice is a constant-time comparison.
    let mac = message_mac(password, &salt, timestamp);
    if mac.verify_slice(received_mac).is_err() {
        stream.write_all(&[REJECT]).await?;
        return Err(Error::BadMac);
    }

    stream.write_all(&[ACCEPT]).await?;
    Ok(salt)
}
