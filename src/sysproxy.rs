//! System proxy registration for the local node.
//!
//! Side-effect subsystem: snapshot the desktop's HTTP proxy settings, point
//! them at the local HTTP ingress, and restore the snapshot on shutdown.
//! Implemented for GNOME via `gsettings`; on other desktops and platforms
//! the calls are logged no-ops. Everything here is best effort — a failure
//! never takes the tunnel down.

/// Snapshot of the system proxy state taken before we touch it.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    /// Proxy mode was "manual" (as opposed to "none" or "auto")
    pub manual: bool,
    /// HTTP proxy host, when manual
    pub host: String,
    /// HTTP proxy port, when manual
    pub port: String,
}

#[cfg(target_os = "linux")]
mod backend {
    use super::ProxySettings;
    use std::process::Command;

    const PROXY_SCHEMA: &str = "org.gnome.system.proxy";
    const HTTP_SCHEMA: &str = "org.gnome.system.proxy.http";

    fn gsettings_get(schema: &str, key: &str) -> Option<String> {
        let output = Command::new("gsettings")
            .args(["get", schema, key])
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        Some(
            String::from_utf8_lossy(&output.stdout)
                .trim()
                .trim_matches('\'')
                .to_string(),
        )
    }

    fn gsettings_set(schema: &str, key: &str, value: &str) -> bool {
        Command::new("gsettings")
            .args(["set", schema, key, value])
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    pub fn current() -> ProxySettings {
        let manual = gsettings_get(PROXY_SCHEMA, "mode").as_deref() == Some("manual");
        if !manual {
            return ProxySettings::default();
        }
        ProxySettings {
            manual,
            host: gsettings_get(HTTP_SCHEMA, "host").unwrap_or_default(),
            port: gsettings_get(HTTP_SCHEMA, "port").unwrap_or_default(),
        }
    }

    pub fn set_http_proxy(host: &str, port: u16) -> bool {
        gsettings_set(HTTP_SCHEMA, "host", host)
            && gsettings_set(HTTP_SCHEMA, "port", &port.to_string())
            && gsettings_set(PROXY_SCHEMA, "mode", "manual")
    }

    pub fn restore(settings: &ProxySettings) -> bool {
        if settings.manual {
            gsettings_set(HTTP_SCHEMA, "host", &settings.host)
                && gsettings_set(HTTP_SCHEMA, "port", &settings.port)
                && gsettings_set(PROXY_SCHEMA, "mode", "manual")
        } else {
            gsettings_set(PROXY_SCHEMA, "mode", "none")
        }
    }
}

#[cfg(not(target_os = "linux"))]
mod backend {
    use super::ProxySettings;

    pub fn current() -> ProxySettings {
        ProxySettings::default()
    }

    pub fn set_http_proxy(_host: &str, _port: u16) -> bool {
        tracing::debug!("system proxy registration not supported on this platform");
        false
    }

    pub fn restore(_settings: &ProxySettings) -> bool {
        false
    }
}

/// Snapshot the current system proxy settings.
pub fn current() -> ProxySettings {
    backend::current()
}

/// Point the system HTTP proxy at `addr` (`host:port`).
pub fn set_http_proxy(addr: &str) -> crate::Result<()> {
    let (host, port) = crate::proxy::parse_address(addr)?;
    if backend::set_http_proxy(host, port) {
        tracing::info!("system proxy set to {addr}");
    } else {
        tracing::warn!("could not set the system proxy (is gsettings available?)");
    }
    Ok(())
}

/// Put the snapshot back. Called from the shutdown path.
pub fn restore(settings: &ProxySettings) {
    if backend::restore(settings) {
        tracing::info!("system proxy restored");
    } else {
        tracing::warn!("could not restore the system proxy");
    }
}
