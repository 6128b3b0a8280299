//! # veiltun
//!
//! A two-node encrypted TCP tunnel. The **local** node accepts client
//! connections on SOCKS5 and HTTP-CONNECT entrypoints and forwards their
//! payloads to the **server** node, which dials the final TCP destination
//! (directly, or through an upstream SOCKS5 proxy) and relays bytes in both
//! directions.
//!
//! ## Wire layering
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Application payload (relayed verbatim)                  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Address exchange (target + status, first records only)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  AEAD record layer (XChaCha20-Poly1305, counter nonces)  │
//! ├─────────────────────────────────────────────────────────┤
//! │  Padding envelopes (optional, random pre/post padding)   │
//! ├─────────────────────────────────────────────────────────┤
//! │  TCP — preceded by the 72-byte cleartext handshake       │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! The handshake authenticates the client via an HMAC over a random salt and
//! a timestamp; the same salt feeds Argon2id to derive the per-session key,
//! so no key material ever crosses the wire.

use std::future::Future;
use std::time::Duration;

pub mod config;
pub mod crypto;
pub mod error;
pub mod local;
pub mod protocol;
pub mod proxy;
pub mod relay;
pub mod server;
pub mod sysproxy;

pub use error::{Error, Result};

/// Largest ciphertext-with-tag length a single record may carry.
pub const MAX_RECORD_SIZE: usize = 0xFFFF;

/// Largest plaintext accepted by a single record write.
pub const MAX_PLAINTEXT_SIZE: usize = MAX_RECORD_SIZE - crypto::TAG_SIZE;

/// Run a pre-relay protocol phase under the configured deadline.
pub(crate) async fn deadline<T>(secs: u64, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(Duration::from_secs(secs), fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout(secs)),
    }
}
