//! Error types for the tunnel.

use thiserror::Error;

/// Result type alias for tunnel operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while establishing or driving a tunnel session.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Network I/O error
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),

    /// A pre-relay phase exceeded its deadline
    #[error("operation timed out after {0}s")]
    Timeout(u64),

    /// The server answered the handshake with a rejection byte
    #[error("server rejected authentication")]
    AuthRejected,

    /// Handshake timestamp outside the tolerated clock-skew window
    #[error("handshake timestamp skewed by {0}s")]
    StaleHandshake(i64),

    /// Handshake MAC verification failed
    #[error("handshake authentication failed")]
    BadMac,

    /// Connection closed in the middle of a protocol unit
    #[error("connection closed mid-record")]
    ShortRead,

    /// Record length field exceeds the wire maximum
    #[error("record of {0} bytes exceeds the wire maximum")]
    PacketTooLarge(usize),

    /// Write larger than a single record can carry
    #[error("write of {0} bytes exceeds the record payload maximum")]
    TooLarge(usize),

    /// Caller's buffer cannot hold a full record payload
    #[error("record payload is {need} bytes but the read buffer holds {have}")]
    BufferTooSmall { need: usize, have: usize },

    /// Per-direction send counter reached its maximum
    #[error("record send counter exhausted")]
    NonceExhausted,

    /// AEAD open failed (wrong key, tampered record, or desynced framing)
    #[error("record decryption failed")]
    Decrypt,

    /// Cryptographic primitive failure outside of tag verification
    #[error("cryptographic failure: {0}")]
    Crypto(&'static str),

    /// Obfuscation envelope declared padding beyond the fixed bound
    #[error("padding length {0} exceeds the 64-byte maximum")]
    PaddingTooLarge(u8),

    /// Key derivation failed
    #[error("key derivation failed")]
    KeyDerivation,

    /// Malformed or oversized target address
    #[error("invalid target address: {0}")]
    Address(String),

    /// Malformed SOCKS5 ingress request
    #[error("malformed SOCKS5 request: {0}")]
    SocksParse(String),

    /// Malformed HTTP ingress request
    #[error("malformed HTTP request: {0}")]
    HttpParse(String),

    /// The server could not reach the requested target
    #[error("target unreachable (status {0:#04x})")]
    TargetUnreachable(u8),

    /// Upstream proxy offered no authentication method we support
    #[error("upstream proxy offers no acceptable authentication method")]
    NoAcceptableAuth,

    /// Upstream proxy rejected our credentials
    #[error("upstream proxy rejected credentials (status {0:#04x})")]
    UpstreamAuthFailed(u8),

    /// Upstream proxy refused the CONNECT
    #[error("upstream proxy refused the connection (reply {0:#04x})")]
    UpstreamReply(u8),
}

impl Error {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Handshake verdicts the server answers with a rejection byte.
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Error::AuthRejected | Error::StaleHandshake(_) | Error::BadMac
        )
    }

    /// Peer-went-away conditions that end a relay without being noteworthy.
    pub fn is_disconnect(&self) -> bool {
        use std::io::ErrorKind;
        match self {
            Error::ShortRead => true,
            Error::Io(e) => matches!(
                e.kind(),
                ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
            ),
            _ => false,
        }
    }
}
