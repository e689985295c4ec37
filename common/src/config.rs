use std::fs;
use std::path::Path;

use byte_unit::Byte;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::error::{QError, QResult};

/// Server-wide configuration, loadable from a TOML file and overlaid with
/// CLI flags (CLI > file > built-in default).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Total primary-tier byte budget, shared across all shards.
    pub size_bytes: u64,
    /// `max_age` in seconds; 0 means no TTL eviction.
    pub age_secs: u64,
    pub statistics_buffer_size: usize,
    pub cert_file: Option<String>,
    pub ca_file: Option<String>,
    pub basic_auth: Option<String>,
    pub api_workers: usize,
    pub cache_shards: usize,
    /// L2 byte budget; 0 disables the secondary tier entirely (§4.5).
    pub l2_cache_size: u64,
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8888,
            size_bytes: 1_000_000_000,
            age_secs: 0,
            statistics_buffer_size: 1000,
            cert_file: None,
            ca_file: None,
            basic_auth: None,
            api_workers: 4,
            cache_shards: 4,
            l2_cache_size: 0,
            debug: false,
        }
    }
}

impl ServerConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> QResult<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| QError::BadRequest(format!("invalid config file: {e}")))
    }

    /// Parses a human byte-size string such as "512MB".
    pub fn parse_byte_size(s: &str) -> QResult<u64> {
        Byte::parse_str(s, true)
            .map(|b| b.as_u64())
            .map_err(|e| QError::BadRequest(format!("invalid size '{s}': {e}")))
    }
}

/// CLI flags from §6, overlaid onto a loaded/default `ServerConfig`.
#[derive(Debug, Parser)]
#[command(name = "qcache", about = "in-memory queryable cache of tabular datasets")]
pub struct CliArgs {
    #[arg(long)]
    pub config: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// Total cache size, e.g. "512MB" or a raw byte count.
    #[arg(long)]
    pub size: Option<String>,

    /// Max dataset age in seconds, 0 = infinite.
    #[arg(long)]
    pub age: Option<u64>,

    #[arg(long = "statistics-buffer-size")]
    pub statistics_buffer_size: Option<usize>,

    #[arg(long = "cert-file")]
    pub cert_file: Option<String>,

    #[arg(long = "ca-file")]
    pub ca_file: Option<String>,

    /// "USER:PASS" — requires `--cert-file` to also be set.
    #[arg(long = "basic-auth")]
    pub basic_auth: Option<String>,

    #[arg(long = "api-workers")]
    pub api_workers: Option<usize>,

    #[arg(long = "cache-shards")]
    pub cache_shards: Option<usize>,

    #[arg(long = "l2-cache-size")]
    pub l2_cache_size: Option<String>,

    #[arg(long)]
    pub debug: bool,
}

impl CliArgs {
    /// Builds the effective config: start from the config file (or
    /// built-in default), then let any flag the user actually passed win.
    pub fn resolve(&self) -> QResult<ServerConfig> {
        let mut cfg = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };

        if let Some(port) = self.port {
            cfg.port = port;
        }
        if let Some(size) = &self.size {
            cfg.size_bytes = ServerConfig::parse_byte_size(size)?;
        }
        if let Some(age) = self.age {
            cfg.age_secs = age;
        }
        if let Some(n) = self.statistics_buffer_size {
            cfg.statistics_buffer_size = n;
        }
        if self.cert_file.is_some() {
            cfg.cert_file = self.cert_file.clone();
        }
        if self.ca_file.is_some() {
            cfg.ca_file = self.ca_file.clone();
        }
        if self.basic_auth.is_some() {
            cfg.basic_auth = self.basic_auth.clone();
        }
        if let Some(n) = self.api_workers {
            cfg.api_workers = n;
        }
        if let Some(n) = self.cache_shards {
            cfg.cache_shards = n;
        }
        if let Some(size) = &self.l2_cache_size {
            cfg.l2_cache_size = ServerConfig::parse_byte_size(size)?;
        }
        cfg.debug = cfg.debug || self.debug;

        if cfg.basic_auth.is_some() && cfg.cert_file.is_none() {
            return Err(QError::BadRequest(
                "--basic-auth requires --cert-file (TLS)".to_string(),
            ));
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_config_has_no_l2() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.l2_cache_size, 0);
        assert_eq!(cfg.age_secs, 0);
    }

    #[test]
    fn parse_byte_size_accepts_units() {
        assert_eq!(ServerConfig::parse_byte_size("1KB").unwrap(), 1000);
        assert_eq!(ServerConfig::parse_byte_size("2000").unwrap(), 2000);
    }

    #[test]
    fn basic_auth_without_tls_is_rejected() {
        let args = CliArgs {
            config: None,
            port: None,
            size: None,
            age: None,
            statistics_buffer_size: None,
            cert_file: None,
            ca_file: None,
            basic_auth: Some("user:pass".to_string()),
            api_workers: None,
            cache_shards: None,
            l2_cache_size: None,
            debug: false,
        };
        assert!(args.resolve().is_err());
    }
}
