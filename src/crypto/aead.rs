//! Authenticated encryption for the record layer.
//!
//! Uses XChaCha20-Poly1305: the 192-bit nonce leaves room for a 64-bit send
//! counter with no risk of collision, and the cipher is constant-time in
//! software everywhere.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};

use crate::crypto::{SessionKey, NONCE_SIZE};
use crate::error::{Error, Result};

/// A record nonce.
///
/// Wire layout: bytes `[0..16]` are zero, bytes `[16..24]` hold the
/// big-endian send counter. The counter lives in the tail, not the head;
/// both ends must agree on this placement or no record will open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordNonce([u8; NONCE_SIZE]);

impl RecordNonce {
    /// Build the nonce for a given send-counter value.
    pub fn from_counter(counter: u64) -> Self {
        let mut nonce = [0u8; NONCE_SIZE];
        nonce[16..].copy_from_slice(&counter.to_be_bytes());
        Self(nonce)
    }

    /// Wrap the nonce bytes received on the wire.
    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self(bytes)
    }

    /// Get the raw nonce bytes.
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }

    /// Get the counter value carried in the nonce (for diagnostics).
    pub fn counter(&self) -> u64 {
        u64::from_be_bytes(self.0[16..].try_into().expect("nonce tail is 8 bytes"))
    }
}

/// XChaCha20-Poly1305 cipher for one session.
pub struct RecordCipher {
    cipher: XChaCha20Poly1305,
}

impl RecordCipher {
    /// Create a cipher instance from a derived session key.
    pub fn new(key: &SessionKey) -> Self {
        Self {
            cipher: XChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }

    /// Encrypt one record payload. Returns ciphertext || tag.
    pub fn seal(&self, nonce: &RecordNonce, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(XNonce::from_slice(nonce.as_bytes()), plaintext)
            .map_err(|_| Error::Crypto("record seal failed"))
    }

    /// Decrypt one record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decrypt`] if the tag check fails (wrong key,
    /// tampered bytes, or a nonce that does not match the sender's).
    pub fn open(&self, nonce: &RecordNonce, ciphertext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .decrypt(XNonce::from_slice(nonce.as_bytes()), ciphertext)
            .map_err(|_| Error::Decrypt)
    }
}
