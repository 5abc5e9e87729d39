//! Process configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

/// Directory holding `tls.crt` and `tls.key`; TLS is off when unset
pub const CERT_DIR_ENV: &str = "CERT_DIR";
pub const WEBHOOK_PORT_ENV: &str = "WEBHOOK_PORT";
pub const SHUTDOWN_GRACE_ENV: &str = "SHUTDOWN_GRACE_SECS";

/// Default webhook server port
pub const DEFAULT_WEBHOOK_PORT: u16 = 8000;
/// Default drain period after a shutdown signal
pub const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 5;

pub const TLS_CERT_FILE: &str = "tls.crt";
pub const TLS_KEY_FILE: &str = "tls.key";

/// Errors reading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Webhook process configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub port: u16,
    pub cert_dir: Option<PathBuf>,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_WEBHOOK_PORT,
            cert_dir: None,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

impl Config {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(dir) = lookup(CERT_DIR_ENV).filter(|dir| !dir.is_empty()) {
            config.cert_dir = Some(PathBuf::from(dir));
        }
        if let Some(port) = lookup(WEBHOOK_PORT_ENV) {
            config.port = parse(WEBHOOK_PORT_ENV, &port)?;
        }
        if let Some(secs) = lookup(SHUTDOWN_GRACE_ENV) {
            config.shutdown_grace = Duration::from_secs(parse(SHUTDOWN_GRACE_ENV, &secs)?);
        }

        Ok(config)
    }

    /// Certificate and key paths when TLS is configured
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        self.cert_dir
            .as_ref()
            .map(|dir| (dir.join(TLS_CERT_FILE), dir.join(TLS_KEY_FILE)))
    }
}

fn parse<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}
