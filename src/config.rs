//! Configuration management for the S3 REST API
//!
//! Supports configuration via:
//! - Environment variables (primary)
//! - Optional TOML config file (secondary)
//!
//! Environment variables take precedence over config file values. The
//! configuration is read once at startup and never reloaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::errors::{Result, S3ApiError};

/// Backend storage type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// AWS S3 or an S3-compatible endpoint
    Aws,
    /// In-process store, for local development
    Memory,
}

impl FromStr for BackendType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "aws" | "s3" => Ok(BackendType::Aws),
            "memory" | "mem" => Ok(BackendType::Memory),
            _ => Err(format!("Unknown backend type: {}", s)),
        }
    }
}

/// Backend storage configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type (aws, memory)
    #[serde(rename = "type", default = "default_backend_type")]
    pub backend_type: BackendType,

    /// Region (defaults to us-east-1)
    #[serde(default = "default_region")]
    pub region: String,

    /// Custom endpoint URL (for S3-compatible services)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Use path-style addressing (`endpoint/bucket/key`)
    #[serde(default)]
    pub force_path_style: bool,

    /// Static access key id; the default credential chain is used when unset
    #[serde(default)]
    pub access_key_id: Option<String>,

    /// Static secret access key
    #[serde(default)]
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("backend_type", &self.backend_type)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("force_path_style", &self.force_path_style)
            .field(
                "access_key_id",
                &self.access_key_id.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            backend_type: default_backend_type(),
            region: default_region(),
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

fn default_backend_type() -> BackendType {
    BackendType::Aws
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (default: 0.0.0.0:3000)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Request timeout in seconds (default: 300)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Max request body size in bytes (default: 100MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            timeout_secs: default_timeout_secs(),
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_body_size() -> usize {
    100 * 1024 * 1024 // 100MB
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Backend storage configuration
    #[serde(default)]
    pub backend: BackendConfig,

    /// Log level (default: info)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables:
    /// - S3API_CONFIG_FILE: optional path to TOML config file
    /// - PORT: listen port, binds 0.0.0.0:PORT (default: 3000)
    /// - S3API_BIND_ADDRESS: full bind address, wins over PORT
    /// - S3API_TIMEOUT_SECS: request timeout (default: 300)
    /// - S3API_MAX_BODY_SIZE: max request size in bytes (default: 100MB)
    /// - S3API_BACKEND_TYPE: aws|memory (default: aws)
    /// - AWS_REGION / S3API_REGION: region (default: us-east-1)
    /// - AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY: static credentials (optional)
    /// - S3API_ENDPOINT: custom endpoint URL (optional)
    /// - S3API_FORCE_PATH_STYLE: true|false (default: false)
    /// - S3API_LOG_LEVEL: log level (default: info)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = match var("S3API_CONFIG_FILE") {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };

        if let Some(port) = var("PORT") {
            let port: u16 = parse_var("PORT", &port)?;
            config.server.bind_address = SocketAddr::from(([0, 0, 0, 0], port));
        }

        if let Some(addr) = var("S3API_BIND_ADDRESS") {
            config.server.bind_address = parse_var("S3API_BIND_ADDRESS", &addr)?;
        }

        if let Some(timeout) = var("S3API_TIMEOUT_SECS") {
            config.server.timeout_secs = parse_var("S3API_TIMEOUT_SECS", &timeout)?;
        }

        if let Some(size) = var("S3API_MAX_BODY_SIZE") {
            config.server.max_body_size = parse_var("S3API_MAX_BODY_SIZE", &size)?;
        }

        if let Some(backend_type) = var("S3API_BACKEND_TYPE") {
            config.backend.backend_type =
                BackendType::from_str(&backend_type).map_err(S3ApiError::Config)?;
        }

        if let Some(region) = var("S3API_REGION").or_else(|| var("AWS_REGION")) {
            config.backend.region = region;
        }

        if let Some(key_id) = var("AWS_ACCESS_KEY_ID") {
            config.backend.access_key_id = Some(key_id);
        }

        if let Some(secret) = var("AWS_SECRET_ACCESS_KEY") {
            config.backend.secret_access_key = Some(secret);
        }

        if let Some(endpoint) = var("S3API_ENDPOINT") {
            config.backend.endpoint = Some(endpoint);
        }

        if let Some(path_style) = var("S3API_FORCE_PATH_STYLE") {
            config.backend.force_path_style = parse_var("S3API_FORCE_PATH_STYLE", &path_style)?;
        }

        if let Some(level) = var("S3API_LOG_LEVEL") {
            config.log_level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| S3ApiError::Config(format!("cannot read {}: {}", path, e)))?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| S3ApiError::Config(e.to_string()))
    }

    fn validate(&self) -> Result<()> {
        let backend = &self.backend;
        if backend.access_key_id.is_some() != backend.secret_access_key.is_some() {
            return Err(S3ApiError::Config(
                "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".to_string(),
            ));
        }
        if let Some(endpoint) = &backend.endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| S3ApiError::Config(format!("invalid endpoint {}: {}", endpoint, e)))?;
        }
        if self.server.timeout_secs == 0 {
            return Err(S3ApiError::Config("timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| S3ApiError::Config(format!("invalid {}={}: {}", name, value, e)))
}
