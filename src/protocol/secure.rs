//! Encrypted record streams.
//!
//! One [`SecureWriter::write`] seals exactly one record on the wire:
//!
//! ```text
//! len_be16[2] ‖ nonce[24] ‖ ciphertext_with_tag[len]
//! ```
//!
//! and one [`SecureReader::read`] delivers exactly one record's payload.
//! Callers must size read buffers for a worst-case record
//! ([`crate::MAX_RECORD_SIZE`]); a payload that does not fit is a hard
//! [`Error::BufferTooSmall`], never a partial read. The address exchange
//! relies on these boundaries.
//!
//! The streams sit on the filter seam [`TunnelReader`]/[`TunnelWriter`]:
//! either the raw socket half, or the padding envelopes of
//! [`ObfuscatedReader`]/[`ObfuscatedWriter`] around it.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::{RecordCipher, RecordNonce, SessionKey, NONCE_SIZE};
use crate::error::{Error, Result};
use crate::protocol::obfuscate::{ObfuscatedReader, ObfuscatedWriter};
use crate::{MAX_PLAINTEXT_SIZE, MAX_RECORD_SIZE};

/// Byte source beneath the record layer.
pub enum TunnelReader<R> {
    Plain(R),
    Obfuscated(ObfuscatedReader<R>),
}

impl<R: AsyncRead + Unpin> TunnelReader<R> {
    fn new(inner: R, obfuscate: bool) -> Self {
        if obfuscate {
            Self::Obfuscated(ObfuscatedReader::new(inner))
        } else {
            Self::Plain(inner)
        }
    }

    async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        match self {
            TunnelReader::Plain(inner) => {
                inner.read_exact(buf).await?;
                Ok(())
            }
            TunnelReader::Obfuscated(inner) => inner.read_exact(buf).await,
        }
    }

    /// Read one byte, or `None` on a clean EOF at a frame boundary.
    ///
    /// `read_exact` cannot tell a peer that closed after zero bytes from
    /// one that closed partway through; this can, so the record layer uses
    /// it for the first header byte.
    async fn read_byte(&mut self) -> Result<Option<u8>> {
        match self {
            TunnelReader::Plain(inner) => {
                let mut byte = [0u8; 1];
                let n = inner.read(&mut byte).await?;
                Ok((n > 0).then(|| byte[0]))
            }
            TunnelReader::Obfuscated(inner) => inner.read_byte().await,
        }
    }
}

/// Byte sink beneath the record layer.
pub enum TunnelWriter<W> {
    Plain(W),
    Obfuscated(ObfuscatedWriter<W>),
}

impl<W: AsyncWrite + Unpin> TunnelWriter<W> {
    fn new(inner: W, obfuscate: bool) -> Self {
        if obfuscate {
            Self::Obfuscated(ObfuscatedWriter::new(inner))
        } else {
            Self::Plain(inner)
        }
    }

    async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        match self {
            TunnelWriter::Plain(inner) => {
                inner.write_all(frame).await?;
                Ok(())
            }
            TunnelWriter::Obfuscated(inner) => inner.write_frame(frame).await,
        }
    }
}

/// Decrypting side of one tunnel direction.
///
/// The nonce arrives inside each record, so the reader carries no counter
/// of its own; the AEAD tag rejects anything the peer did not seal.
pub struct SecureReader<R> {
    inner: TunnelReader<R>,
    cipher: RecordCipher,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    pub fn new(inner: R, key: &SessionKey, obfuscate: bool) -> Self {
        Self {
            inner: TunnelReader::new(inner, obfuscate),
            cipher: RecordCipher::new(key),
        }
    }

    /// Read one record and deliver its full payload into `buf`.
    ///
    /// Returns `Ok(0)` on a clean EOF at a record boundary. EOF inside a
    /// record — the length header included — is [`Error::ShortRead`].
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut header = [0u8; 2];
        match self.inner.read_byte().await? {
            None => return Ok(0),
            Some(byte) => header[0] = byte,
        }
        self.inner
            .read_exact(&mut header[1..])
            .await
            .map_err(mid_record)?;

        let len = u16::from_be_bytes(header) as usize;
        if len > MAX_RECORD_SIZE {
            return Err(Error::PacketTooLarge(len));
        }

        let mut nonce = [0u8; NONCE_SIZE];
        self.inner.read_exact(&mut nonce).await.map_err(mid_record)?;

        let mut ciphertext = vec![0u8; len];
        self.inner
            .read_exact(&mut ciphertext)
            .await
            .map_err(mid_record)?;

        let plaintext = self
            .cipher
            .open(&RecordNonce::from_bytes(nonce), &ciphertext)?;
        if plaintext.len() > buf.len() {
            return Err(Error::BufferTooSmall {
                need: plaintext.len(),
                have: buf.len(),
            });
        }
        buf[..plaintext.len()].copy_from_slice(&plaintext);
        Ok(plaintext.len())
    }
}

fn mid_record(err: Error) -> Error {
    match err {
        Error::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Error::ShortRead,
        other => other,
    }
}

/// Encrypting side of one tunnel direction. Owns the send counter.
pub struct SecureWriter<W> {
    inner: TunnelWriter<W>,
    cipher: RecordCipher,
    counter: u64,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    pub fn new(inner: W, key: &SessionKey, obfuscate: bool) -> Self {
        Self {
            inner: TunnelWriter::new(inner, obfuscate),
            cipher: RecordCipher::new(key),
            counter: 0,
        }
    }

    /// Seal `plaintext` into one record and write it.
    ///
    /// Empty writes are no-ops; writes above [`crate::MAX_PLAINTEXT_SIZE`]
    /// are refused with [`Error::TooLarge`].
    pub async fn write(&mut self, plaintext: &[u8]) -> Result<()> {
        if plaintext.is_empty() {
            return Ok(());
        }
        if plaintext.len() > MAX_PLAINTEXT_SIZE {
            return Err(Error::TooLarge(plaintext.len()));
        }

        let nonce = RecordNonce::from_counter(self.counter);
        self.counter = self.counter.checked_add(1).ok_or(Error::NonceExhausted)?;

        let ciphertext = self.cipher.seal(&nonce, plaintext)?;

        let mut record = Vec::with_capacity(2 + NONCE_SIZE + ciphertext.len());
        record.extend_from_slice(&(ciphertext.len() as u16).to_be_bytes());
        record.extend_from_slice(nonce.as_bytes());
        record.extend_from_slice(&ciphertext);
        self.inner.write_frame(&record).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{derive_key, SecureRandom, TAG_SIZE};

    fn test_key() -> SessionKey {
        let salt = [0x07u8; crate::crypto::SALT_SIZE];
        derive_key("record layer tests", &salt).unwrap()
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);
        let mut reader = SecureReader::new(server_end, &key, false);

        writer.write(b"hello across the tunnel").await.unwrap();

        let mut buf = [0u8; 256];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello across the tunnel");
    }

    #[tokio::test]
    async fn test_one_write_is_one_record() {
        let key = test_key();
        let (client_end, mut server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);

        writer.write(&[0x55u8; 100]).await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        server_end.read_to_end(&mut wire).await.unwrap();
        assert_eq!(wire.len(), 2 + NONCE_SIZE + 100 + TAG_SIZE);
        assert_eq!(
            u16::from_be_bytes([wire[0], wire[1]]) as usize,
            100 + TAG_SIZE
        );
    }

    #[tokio::test]
    async fn test_nonces_are_monotonic_with_zero_prefix() {
        let key = test_key();
        let (client_end, mut server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);

        for _ in 0..3 {
            writer.write(b"x").await.unwrap();
        }
        drop(writer);

        let mut wire = Vec::new();
        server_end.read_to_end(&mut wire).await.unwrap();

        let record_len = 2 + NONCE_SIZE + 1 + TAG_SIZE;
        for (i, record) in wire.chunks(record_len).enumerate() {
            let nonce = &record[2..2 + NONCE_SIZE];
            assert_eq!(&nonce[..16], &[0u8; 16]);
            assert_eq!(
                u64::from_be_bytes(nonce[16..].try_into().unwrap()),
                i as u64
            );
        }
    }

    #[tokio::test]
    async fn test_buffer_too_small_is_an_error() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);
        let mut reader = SecureReader::new(server_end, &key, false);

        writer.write(&[0u8; 32]).await.unwrap();

        let mut small = [0u8; 8];
        let result = reader.read(&mut small).await;
        assert!(matches!(
            result,
            Err(Error::BufferTooSmall { need: 32, have: 8 })
        ));
    }

    #[tokio::test]
    async fn test_oversized_write_refused() {
        let key = test_key();
        let (client_end, _server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);

        let oversized = vec![0u8; MAX_PLAINTEXT_SIZE + 1];
        assert!(matches!(
            writer.write(&oversized).await,
            Err(Error::TooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_max_plaintext_roundtrip() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(512 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);
        let mut reader = SecureReader::new(server_end, &key, false);

        let mut payload = vec![0u8; MAX_PLAINTEXT_SIZE];
        SecureRandom::fill(&mut payload);

        let expected = payload.clone();
        let write_task = tokio::spawn(async move { writer.write(&payload).await });

        let mut buf = vec![0u8; MAX_RECORD_SIZE];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &expected[..]);
        write_task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_tampered_record_rejected() {
        let key = test_key();
        let (client_end, mut relay_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);

        writer.write(b"integrity matters").await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        relay_end.read_to_end(&mut wire).await.unwrap();

        // Flip one ciphertext bit and replay the record.
        let last = wire.len() - 1;
        wire[last] ^= 0x80;

        let (mut feeder, victim_end) = tokio::io::duplex(256 * 1024);
        let mut reader = SecureReader::new(victim_end, &key, false);
        feeder.write_all(&wire).await.unwrap();

        let mut buf = [0u8; 256];
        assert!(matches!(reader.read(&mut buf).await, Err(Error::Decrypt)));
    }

    #[tokio::test]
    async fn test_eof_at_record_boundary() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);
        let mut reader = SecureReader::new(server_end, &key, false);

        writer.write(b"last words").await.unwrap();
        drop(writer);

        let mut buf = [0u8; 256];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"last words");
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_record() {
        let key = test_key();
        let (client_end, mut relay_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, false);

        writer.write(b"cut short").await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        relay_end.read_to_end(&mut wire).await.unwrap();

        let (mut feeder, victim_end) = tokio::io::duplex(256 * 1024);
        let mut reader = SecureReader::new(victim_end, &key, false);
        feeder.write_all(&wire[..wire.len() - 4]).await.unwrap();
        drop(feeder);

        let mut buf = [0u8; 256];
        assert!(matches!(reader.read(&mut buf).await, Err(Error::ShortRead)));
    }

    #[tokio::test]
    async fn test_eof_inside_record_header() {
        let key = test_key();
        let (mut feeder, victim_end) = tokio::io::duplex(256 * 1024);
        let mut reader = SecureReader::new(victim_end, &key, false);

        // Only 1 of the 2 header bytes before the peer hangs up: a
        // truncation, not a record-boundary close.
        feeder.write_all(&[0x00]).await.unwrap();
        drop(feeder);

        let mut buf = [0u8; 256];
        assert!(matches!(reader.read(&mut buf).await, Err(Error::ShortRead)));
    }

    #[tokio::test]
    async fn test_eof_inside_obfuscated_record_header() {
        let key = test_key();
        let (client_end, mut relay_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, true);

        writer.write(b"enveloped").await.unwrap();
        drop(writer);

        let mut wire = Vec::new();
        relay_end.read_to_end(&mut wire).await.unwrap();

        // Truncate inside the envelope payload.
        let (mut feeder, victim_end) = tokio::io::duplex(256 * 1024);
        let mut reader = SecureReader::new(victim_end, &key, true);
        feeder.write_all(&wire[..wire.len() - 8]).await.unwrap();
        drop(feeder);

        let mut buf = [0u8; 256];
        assert!(matches!(reader.read(&mut buf).await, Err(Error::ShortRead)));
    }

    #[tokio::test]
    async fn test_stacked_on_obfuscation() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, true);
        let mut reader = SecureReader::new(server_end, &key, true);

        writer.write(b"wrapped twice").await.unwrap();
        writer.write(b"and again").await.unwrap();

        let mut buf = [0u8; 256];
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"wrapped twice");
        let n = reader.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"and again");
    }

    #[tokio::test]
    async fn test_obfuscation_mismatch_fails() {
        let key = test_key();
        let (client_end, server_end) = tokio::io::duplex(256 * 1024);
        let mut writer = SecureWriter::new(client_end, &key, true);
        let mut reader = SecureReader::new(server_end, &key, false);

        writer.write(b"framing desync").await.unwrap();
        drop(writer);

        // The plain reader misparses envelope bytes as a record header; the
        // session dies with a framing or decryption error, never silent
        // garbage.
        let mut buf = [0u8; crate::MAX_RECORD_SIZE];
        let result = reader.read(&mut buf).await;
        assert!(matches!(
            result,
            Err(Error::Decrypt) | Err(Error::ShortRead) | Err(Error::PacketTooLarge(_))
        ));
    }
}
