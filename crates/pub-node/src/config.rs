//! Node configuration.
//!
//! Resolution order: defaults, then a TOML file, then `PUB_*` environment
//! variables, then command-line flags.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub socks_host: String,
    pub socks_port: u16,
    pub control_host: String,
    pub control_port: u16,
    pub control_password: String,
    /// Loopback listener exported as the onion service.
    pub public_addr: SocketAddr,
    /// Loopback listener for the local operator.
    pub private_addr: SocketAddr,
    /// Port the onion service advertises.
    pub virtual_port: u16,
    pub request_timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            socks_host: "127.0.0.1".to_string(),
            socks_port: 9050,
            control_host: "127.0.0.1".to_string(),
            control_port: 9051,
            control_password: String::new(),
            public_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            private_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            virtual_port: 80,
            request_timeout_secs: 60,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Env { var, value })
}

impl NodeConfig {
    /// Load from `path` if given, else from `PUB_CONFIG` if set, else
    /// defaults; then apply the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env_path = std::env::var_os("PUB_CONFIG").map(PathBuf::from);
        let config = match path.map(Path::to_path_buf).or(from_env_path) {
            Some(path) => Self::from_toml(path)?,
            None => Self::default(),
        };
        config.with_env()
    }

    pub fn from_toml(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `PUB_*` environment overrides.
    pub fn with_env(self) -> Result<Self, ConfigError> {
        self.with_vars(|name| std::env::var(name).ok())
    }

    fn with_vars(mut self, var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        if let Some(host) = var("PUB_SOCKS_HOST") {
            self.socks_host = host;
        }
        if let Some(port) = var("PUB_SOCKS_PORT") {
            self.socks_port = parse_env("PUB_SOCKS_PORT", port)?;
        }
        if let Some(host) = var("PUB_CONTROL_HOST") {
            self.control_host = host;
        }
        if let Some(port) = var("PUB_CONTROL_PORT") {
            self.control_port = parse_env("PUB_CONTROL_PORT", port)?;
        }
        if let Some(password) = var("PUB_CONTROL_PASSWORD") {
            self.control_password = password;
        }
        if let Some(addr) = var("PUB_PRIVATE_ADDR") {
            self.private_addr = parse_env("PUB_PRIVATE_ADDR", addr)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socks_port == 0 {
            return Err(ConfigError::Invalid("socks_port must be > 0".into()));
        }
        if self.control_port == 0 {
            return Err(ConfigError::Invalid("control_port must be > 0".into()));
        }
        if self.virtual_port == 0 {
            return Err(ConfigError::Invalid("virtual_port must be > 0".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Lower-case the database name and make sure it ends in `.db`.
pub fn normalize_db_path(raw: &str) -> PathBuf {
    let mut name = raw.to_lowercase();
    if !name.ends_with(".db") {
        name.push_str(".db");
    }
    PathBuf::from(name)
}
