//! Cryptographic primitives for the tunnel.
//!
//! This module provides:
//! - Argon2id key derivation from the shared password and per-session salt
//! - XChaCha20-Poly1305 AEAD for the record layer
//! - Secure random number generation
//!
//! Derived key material is zeroized on drop to prevent memory leakage.

mod aead;
mod kdf;
mod random;

pub use aead::{RecordCipher, RecordNonce};
pub use kdf::{derive_key, SessionKey};
pub use random::SecureRandom;

/// Size of the derived symmetric key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the handshake salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of the AEAD nonce in bytes (192 bits for XChaCha20-Poly1305)
pub const NONCE_SIZE: usize = 24;

/// Size of the AEAD authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_and_encrypt() {
        let salt: [u8; SALT_SIZE] = SecureRandom::bytes();

        // Both ends derive the same key from the same password and salt.
        let local_key = derive_key("hunter2hunter2!!", &salt).unwrap();
        let server_key = derive_key("hunter2hunter2!!", &salt).unwrap();
        assert_eq!(local_key.as_bytes(), server_key.as_bytes());

        let sealer = RecordCipher::new(&local_key);
        let opener = RecordCipher::new(&server_key);

        let nonce = RecordNonce::from_counter(0);
        let ciphertext = sealer.seal(&nonce, b"first record").unwrap();
        let plaintext = opener.open(&nonce, &ciphertext).unwrap();
        assert_eq!(plaintext, b"first record");
    }
}
