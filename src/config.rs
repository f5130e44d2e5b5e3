// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Configuration is loaded from the environment once at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `4005` |
//! | `DATA_DIR` | Directory holding the redb database | `./data` |
//! | `ACCESS_TOKEN_SECRET` | HS256 secret for access tokens | Required |
//! | `ACCESS_TOKEN_EXPIRY_SECS` | Lifetime of issued access tokens | `900` |
//! | `RESOLVER_RETRY_ATTEMPTS` | Membership lookups per feed handshake | `3` |
//! | `TLS_CERT_PATH` / `TLS_KEY_PATH` | PEM certificate chain and key; HTTPS when both are set | unset |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";

/// Environment variable name for the data directory path.
pub const DATA_DIR_ENV: &str = "DATA_DIR";

/// Environment variable holding the access-token signing secret.
///
/// Shared with whatever issues tokens to clients. Never logged.
pub const ACCESS_TOKEN_SECRET_ENV: &str = "ACCESS_TOKEN_SECRET";
pub const ACCESS_TOKEN_EXPIRY_ENV: &str = "ACCESS_TOKEN_EXPIRY_SECS";
pub const RESOLVER_RETRY_ATTEMPTS_ENV: &str = "RESOLVER_RETRY_ATTEMPTS";
pub const TLS_CERT_PATH_ENV: &str = "TLS_CERT_PATH";
pub const TLS_KEY_PATH_ENV: &str = "TLS_KEY_PATH";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 4005;
pub const DEFAULT_DATA_DIR: &str = "./data";
pub const DEFAULT_TOKEN_EXPIRY_SECS: u64 = 900;
pub const DEFAULT_RESOLVER_RETRY_ATTEMPTS: u32 = 3;

/// Default `RUST_LOG` filter.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },

    #[error("{TLS_CERT_PATH_ENV} and {TLS_KEY_PATH_ENV} must be set together")]
    PartialTls,
}

/// PEM files for HTTPS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsPaths {
    pub cert: PathBuf,
    pub key: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Settings read from the environment at startup.
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub access_token_secret: String,
    pub access_token_ttl: Duration,
    pub resolver_retry_attempts: u32,
    pub tls: Option<TlsPaths>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("data_dir", &self.data_dir)
            .field("access_token_secret", &"<redacted>")
            .field("access_token_ttl", &self.access_token_ttl)
            .field("resolver_retry_attempts", &self.resolver_retry_attempts)
            .field("tls", &self.tls)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl AppConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to read variables. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let host: IpAddr = parse_or(get(HOST_ENV), HOST_ENV, DEFAULT_HOST.parse().ok())?;
        let port: u16 = parse_or(get(PORT_ENV), PORT_ENV, Some(DEFAULT_PORT))?;

        let access_token_secret =
            get(ACCESS_TOKEN_SECRET_ENV).ok_or(ConfigError::Missing(ACCESS_TOKEN_SECRET_ENV))?;

        let expiry_secs: u64 = parse_or(
            get(ACCESS_TOKEN_EXPIRY_ENV),
            ACCESS_TOKEN_EXPIRY_ENV,
            Some(DEFAULT_TOKEN_EXPIRY_SECS),
        )?;

        let resolver_retry_attempts: u32 = parse_or(
            get(RESOLVER_RETRY_ATTEMPTS_ENV),
            RESOLVER_RETRY_ATTEMPTS_ENV,
            Some(DEFAULT_RESOLVER_RETRY_ATTEMPTS),
        )?;
        if resolver_retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                name: RESOLVER_RETRY_ATTEMPTS_ENV,
                value: "0".to_string(),
            });
        }

        let tls = match (get(TLS_CERT_PATH_ENV), get(TLS_KEY_PATH_ENV)) {
            (Some(cert), Some(key)) => Some(TlsPaths {
                cert: cert.into(),
                key: key.into(),
            }),
            (None, None) => None,
            _ => return Err(ConfigError::PartialTls),
        };

        let log_format = match get(LOG_FORMAT_ENV).as_deref().map(str::to_ascii_lowercase) {
            None => LogFormat::Pretty,
            Some(format) if format == "pretty" => LogFormat::Pretty,
            Some(format) if format == "json" => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: LOG_FORMAT_ENV,
                    value: other,
                })
            }
        };

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            data_dir: get(DATA_DIR_ENV)
                .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string())
                .into(),
            access_token_secret,
            access_token_ttl: Duration::from_secs(expiry_secs),
            resolver_retry_attempts,
            tls,
            log_format,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    name: &'static str,
    default: Option<T>,
) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        None => default.ok_or(ConfigError::Missing(name)),
    }
}
