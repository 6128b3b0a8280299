//! Random-padding envelope framing.
//!
//! When obfuscation is enabled (on both ends, or neither), every write to
//! the socket is wrapped in an envelope:
//!
//! ```text
//! pre_len[1] ‖ pre[pre_len] ‖ payload_len_be16[2] ‖ payload ‖ post_len[1] ‖ post[post_len]
//! ```
//!
//! Padding lengths are drawn uniformly from `[0, 64]` and the padding bytes
//! themselves come from the CSPRNG; the peer discards them. The filter is
//! byte-transparent: the reader buffers envelope payloads and serves exact
//! reads across envelope boundaries, so the layers above never see the
//! framing.

use rand::Rng;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::crypto::SecureRandom;
use crate::error::{Error, Result};

/// Largest padding run an envelope may declare, in bytes.
pub const MAX_PADDING: usize = 64;

/// Largest payload one envelope can carry (16-bit length field).
const MAX_ENVELOPE_PAYLOAD: usize = 0xFFFF;

fn padding_len() -> usize {
    SecureRandom::rng().gen_range(0..=MAX_PADDING)
}

/// Writer half of the padding filter.
pub struct ObfuscatedWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ObfuscatedWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one frame, wrapped in an envelope with fresh random padding.
    ///
    /// Frames longer than the 16-bit payload field allows are split across
    /// consecutive envelopes; the reader's buffering reassembles them.
    pub async fn write_frame(&mut self, payload: &[u8]) -> Result<()> {
        for chunk in payload.chunks(MAX_ENVELOPE_PAYLOAD) {
            self.write_envelope(chunk).await?;
        }
        Ok(())
    }

    async fn write_envelope(&mut self, payload: &[u8]) -> Result<()> {
        let pre_len = padding_len();
        let post_len = padding_len();

        let mut envelope = Vec::with_capacity(4 + pre_len + payload.len() + post_len);
        envelope.push(pre_len as u8);
        let start = envelope.len();
        envelope.resize(start + pre_len, 0);
        SecureRandom::fill(&mut envelope[start..]);

        envelope.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        envelope.extend_from_slice(payload);

        envelope.push(post_len as u8);
        let start = envelope.len();
        envelope.resize(start + post_len, 0);
        SecureRandom::fill(&mut envelope[start..]);

        self.inner.write_all(&envelope).await?;
        Ok(())
    }
}

/// EOF inside an envelope is a truncation, not an ordinary close.
fn mid_envelope(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::ShortRead
    } else {
        Error::Io(err)
    }
}

/// Reader half of the padding filter.
pub struct ObfuscatedReader<R> {
    inner: R,
    pending: Vec<u8>,
    pos: usize,
}

impl<R: AsyncRead + Unpin> ObfuscatedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Fill `buf` exactly, decoding as many envelopes as needed.
    pub async fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            if self.pos == self.pending.len() {
                self.fill().await?;
            }
            let n = (buf.len() - filled).min(self.pending.len() - self.pos);
            buf[filled..filled + n].copy_from_slice(&self.pending[self.pos..self.pos + n]);
            self.pos += n;
            filled += n;
        }
        Ok(())
    }

    /// Read one byte, or `None` on a clean EOF at an envelope boundary.
    pub async fn read_byte(&mut self) -> Result<Option<u8>> {
        while self.pos == self.pending.len() {
            let mut first = [0u8; 1];
            let n = self.inner.read(&mut first).await?;
            if n == 0 {
                return Ok(None);
            }
            self.fill_envelope(first[0]).await?;
        }
        let byte = self.pending[self.pos];
        self.pos += 1;
        Ok(Some(byte))
    }

    /// Decode one envelope into the pending buffer, discarding padding.
    async fn fill(&mut self) -> Result<()> {
        let mut len_buf = [0u8; 1];
        self.inner.read_exact(&mut len_buf).await?;
        self.fill_envelope(len_buf[0]).await
    }

    /// Decode the rest of an envelope whose first byte (`pre_len`) is
    /// already consumed. EOF anywhere in here maps to `ShortRead`.
    async fn fill_envelope(&mut self, pre_len: u8) -> Result<()> {
        if pre_len as usize > MAX_PADDING {
            return Err(Error::PaddingTooLarge(pre_len));
        }
        self.skip(pre_len as usize).await?;

        let mut payload_len = [0u8; 2];
        self.inner
            .read_exact(&mut payload_len)
            .await
            .map_err(mid_envelope)?;
        let payload_len = u16::from_be_bytes(payload_len) as usize;

        self.pending.clear();
        self.pending.resize(payload_len, 0);
        self.pos = 0;
        self.inner
            .read_exact(&mut self.pending)
            .await
            .map_err(mid_envelope)?;

        let mut len_buf = [0u8; 1];
        self.inner
            .read_exact(&mut len_buf)
            .await
            .map_err(mid_envelope)?;
        if len_buf[0] as usize > MAX_PADDING {
            return Err(Error::PaddingTooLarge(len_buf[0]));
        }
        self.skip(len_buf[0] as usize).await
    }

    async fn skip(&mut self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let mut scratch = [0u8; MAX_PADDING];
        self.inner
            .read_exact(&mut scratch[..n])
            .await
            .map_err(mid_envelope)?;
        Ok(())
    }
}
