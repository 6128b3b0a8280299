//! Ingress protocols and the upstream SOCKS5 dialer.

pub mod http;
pub mod socks5;
pub mod upstream;

use crate::error::{Error, Result};

/// Split a `"host:port"` target on the last colon and validate it.
///
/// IPv6 hosts arrive unbracketed (the ingress composes them from the
/// `Ipv6Addr` Display form), so splitting on the last colon is the only
/// correct parse.
pub fn parse_address(target: &str) -> Result<(&str, u16)> {
    let (host, port) = target
        .rsplit_once(':')
        .ok_or_else(|| Error::Address(format!("{target}: missing port")))?;
    if host.is_empty() || host.len() > 255 {
        return Err(Error::Address(format!("{target}: bad host length")));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| Error::Address(format!("{target}: bad port")))?;
    if port == 0 {
        return Err(Error::Address(format!("{target}: port out of range")));
    }
    Ok((host, port))
}
