//! Runtime configuration for the two nodes.
//!
//! Values resolve in three layers: built-in defaults, then the optional
//! JSON config file named by `-c/--config`, then command-line flags. Flags
//! win over the file, the file wins over defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;

use crate::error::{Error, Result};

const DEFAULT_PORT: u16 = 8081;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_LOCAL_ADDR: &str = "127.0.0.1:1080";
const DEFAULT_HTTP_PROXY_ADDR: &str = "127.0.0.1:8080";

/// Resolved server-node configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub password: String,
    pub timeout_secs: u64,
    pub log_level: String,
    pub obfuscate: bool,
    pub upstream_proxy: Option<String>,
    pub upstream_username: Option<String>,
    pub upstream_password: Option<String>,
}

/// Resolved local-node configuration.
#[derive(Debug, Clone)]
pub struct LocalConfig {
    pub local_addr: String,
    pub http_proxy_addr: String,
    pub server: String,
    pub password: String,
    pub timeout_secs: u64,
    pub log_level: String,
    pub obfuscate: bool,
    pub auto_proxy: bool,
}

/// Command-line flags for `veiltun-server`.
#[derive(Debug, Parser)]
#[command(name = "veiltun-server", about = "veiltun tunnel server", version)]
pub struct ServerArgs {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Listen port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Shared tunnel password
    #[arg(short = 'k', long)]
    pub password: Option<String>,

    /// Per-phase timeout in seconds
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Wrap every record in random-padding envelopes
    #[arg(short, long)]
    pub obfuscate: bool,

    /// Upstream SOCKS5 proxy to dial targets through, host:port
    #[arg(long)]
    pub upstream_proxy: Option<String>,

    /// Username for the upstream proxy
    #[arg(long)]
    pub upstream_username: Option<String>,

    /// Password for the upstream proxy
    #[arg(long)]
    pub upstream_password: Option<String>,
}

/// Command-line flags for `veiltun-local`.
#[derive(Debug, Parser)]
#[command(name = "veiltun-local", about = "veiltun local proxy", version)]
pub struct LocalArgs {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// SOCKS5 listen address
    #[arg(short = 'b', long)]
    pub local_addr: Option<String>,

    /// HTTP CONNECT listen address
    #[arg(long)]
    pub http_proxy_addr: Option<String>,

    /// Server address, host:port
    #[arg(short, long)]
    pub server: Option<String>,

    /// Shared tunnel password
    #[arg(short = 'k', long)]
    pub password: Option<String>,

    /// Per-phase timeout in seconds
    #[arg(short, long)]
    pub timeout_secs: Option<u64>,

    /// Log level (debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Wrap every record in random-padding envelopes
    #[arg(short, long)]
    pub obfuscate: bool,

    /// Leave the OS proxy settings alone
    #[arg(long)]
    pub no_auto_proxy: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ServerFile {
    port: Option<u16>,
    password: Option<String>,
    timeout_secs: Option<u64>,
    log_level: Option<String>,
    obfuscate: Option<bool>,
    upstream_proxy: Option<String>,
    upstream_username: Option<String>,
    upstream_password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct LocalFile {
    local_addr: Option<String>,
    http_proxy_addr: Option<String>,
    server: Option<String>,
    password: Option<String>,
    timeout_secs: Option<u64>,
    log_level: Option<String>,
    obfuscate: Option<bool>,
    auto_proxy: Option<bool>,
}

fn read_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&content)
        .map_err(|e| Error::config(format!("cannot parse {}: {e}", path.display())))
}

fn check_common(password: &str, timeout_secs: u64, log_level: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::config(
            "password is required (set -k or the config file)",
        ));
    }
    if timeout_secs == 0 {
        return Err(Error::config("timeout_secs must be positive"));
    }
    if !matches!(log_level, "debug" | "info" | "warn" | "error") {
        return Err(Error::config(format!(
            "log_level must be one of debug, info, warn, error (got {log_level})"
        )));
    }
    Ok(())
}

impl ServerConfig {
    /// Merge flags over the optional file over defaults, then validate.
    pub fn resolve(args: ServerArgs) -> Result<Self> {
        let file: ServerFile = match &args.config {
            Some(path) => read_file(path)?,
            None => ServerFile::default(),
        };

        let config = Self {
            port: args.port.or(file.port).unwrap_or(DEFAULT_PORT),
            password: args.password.or(file.password).unwrap_or_default(),
            timeout_secs: args
                .timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            obfuscate: args.obfuscate || file.obfuscate.unwrap_or(false),
            upstream_proxy: args.upstream_proxy.or(file.upstream_proxy),
            upstream_username: args.upstream_username.or(file.upstream_username),
            upstream_password: args.upstream_password.or(file.upstream_password),
        };

        check_common(&config.password, config.timeout_secs, &config.log_level)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl LocalConfig {
    /// Merge flags over the optional file over defaults, then validate.
    pub fn resolve(args: LocalArgs) -> Result<Self> {
        let file: LocalFile = match &args.config {
            Some(path) => read_file(path)?,
            None => LocalFile::default(),
        };

        let config = Self {
            local_addr: args
                .local_addr
                .or(file.local_addr)
                .unwrap_or_else(|| DEFAULT_LOCAL_ADDR.into()),
            http_proxy_addr: args
                .http_proxy_addr
                .or(file.http_proxy_addr)
                .unwrap_or_else(|| DEFAULT_HTTP_PROXY_ADDR.into()),
            server: args.server.or(file.server).unwrap_or_default(),
            password: args.password.or(file.password).unwrap_or_default(),
            timeout_secs: args
                .timeout_secs
                .or(file.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| DEFAULT_LOG_LEVEL.into()),
            obfuscate: args.obfuscate || file.obfuscate.unwrap_or(false),
            auto_proxy: !args.no_auto_proxy && file.auto_proxy.unwrap_or(true),
        };

        if config.server.is_empty() {
            return Err(Error::config(
                "server address is required (set -s or the config file)",
            ));
        }
        check_common(&config.password, config.timeout_secs, &config.log_level)?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
