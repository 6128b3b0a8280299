//! Password-based key derivation.
//!
//! Argon2id turns the shared password and the per-session handshake salt
//! into the record-layer key. The parameters below are part of the wire
//! contract: both ends must derive the same key from the same inputs, so
//! they are constants rather than configuration.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{KEY_SIZE, SALT_SIZE};
use crate::error::{Error, Result};

/// Argon2id pass count
pub const ARGON2_TIME_COST: u32 = 1;

/// Argon2id memory cost in KiB (64 MiB)
pub const ARGON2_MEMORY_KIB: u32 = 64 * 1024;

/// Argon2id lane count
pub const ARGON2_LANES: u32 = 4;

/// A derived 256-bit session key.
///
/// Automatically zeroized when dropped.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey([u8; KEY_SIZE]);

impl SessionKey {
    /// Get the raw key bytes.
    ///
    /// # Security
    ///
    /// Handle with care - this is secret key material.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }
}

/// Derive the session key from the shared password and the handshake salt.
pub fn derive_key(password: &str, salt: &[u8; SALT_SIZE]) -> Result<SessionKey> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_TIME_COST,
        ARGON2_LANES,
        Some(KEY_SIZE),
    )
    .map_err(|_| Error::KeyDerivation)?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|_| Error::KeyDerivation)?;

    Ok(SessionKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_is_deterministic() {
        let salt = [0x42u8; SALT_SIZE];

        let a = derive_key("correct horse", &salt).unwrap();
        let b = derive_key("correct horse", &salt).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_salt_changes_key() {
        let a = derive_key("correct horse", &[0x01u8; SALT_SIZE]).unwrap();
        let b = derive_key("correct horse", &[0x02u8; SALT_SIZE]).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_password_changes_key() {
        let salt = [0x42u8; SALT_SIZE];

        let a = derive_key("correct horse", &salt).unwrap();
        let b = derive_key("battery staple", &salt).unwrap();
        assert_ne!(a.as_bytes(), b.as_bytes());
    }
}
