//! Configuration data structures for Arbor.
//!
//! These types map directly to TOML (also JSON / YAML) configuration files. They are
//! serde‑friendly and include defaults so that minimal configs remain concise. Sites configured
//! here are static-serving roots; programmatic handlers are attached through the library API.
use serde::{Deserialize, Serialize};

use crate::core::segment::SegmentMatcher;

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_redirect_status() -> u16 {
    308
}

/// One address to accept connections on
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ListenConfig {
    /// Socket address, e.g. `0.0.0.0:8080`
    pub address: String,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `info` or `arbor=debug,tower_http=info`
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of pretty console output
    #[serde(default)]
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// CDN host pair of a site
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CdnConfig {
    /// Host name of the CDN
    pub host: String,
    /// Host name whose cacheable files are redirected to the CDN
    pub origin_host: String,
}

/// Redirect answered by a configured node
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RedirectConfig {
    pub location: String,
    #[serde(default = "default_redirect_status")]
    pub status: u16,
}

/// A resource node declared in configuration
///
/// Configured nodes carry no handlers; they alias spellings onto directories and may redirect.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct NodeConfig {
    /// Accepted spellings, each a list of tokens
    pub names: SegmentMatcher,
    /// Directory contributed below the parent's; defaults to the canonical spelling
    #[serde(default)]
    pub relative_dir: Option<String>,
    #[serde(default)]
    pub home_file: Option<String>,
    #[serde(default)]
    pub redirect: Option<RedirectConfig>,
    #[serde(default)]
    pub children: Vec<NodeConfig>,
}

/// One dispatch root
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SiteConfig {
    /// Name used in logs
    pub name: String,
    /// Directory files are served from; a fresh non-existent directory when absent
    #[serde(default)]
    pub root_dir: Option<String>,
    /// Directory below `root_dir` for paths no node claims
    #[serde(default)]
    pub root_relative: Option<String>,
    #[serde(default)]
    pub hosts: Option<Vec<String>>,
    #[serde(default)]
    pub host_ports: Option<Vec<u16>>,
    #[serde(default)]
    pub ips: Option<Vec<String>>,
    #[serde(default)]
    pub ip_ports: Option<Vec<u16>>,
    #[serde(default = "default_true")]
    pub static_fallback: bool,
    #[serde(default)]
    pub home_file: Option<String>,
    #[serde(default)]
    pub cdn: Option<CdnConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

impl SiteConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            root_dir: None,
            root_relative: None,
            hosts: None,
            host_ports: None,
            ips: None,
            ip_ports: None,
            static_fallback: true,
            home_file: None,
            cdn: None,
            nodes: Vec::new(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub listen: Vec<ListenConfig>,
    /// Compress responses (gzip, brotli, zstd, deflate as negotiated)
    #[serde(default)]
    pub compression: bool,
    #[serde(default)]
    pub log: LogConfig,
    pub sites: Vec<SiteConfig>,
}

impl AppConfig {
    /// Create a new configuration builder
    pub fn builder() -> AppConfigBuilder {
        AppConfigBuilder::default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen: vec![ListenConfig {
                address: "127.0.0.1:8080".to_string(),
            }],
            compression: false,
            log: LogConfig::default(),
            sites: Vec::new(),
        }
    }
}

/// Builder for AppConfig to allow for cleaner configuration creation
#[derive(Default)]
pub struct AppConfigBuilder {
    listen: Vec<ListenConfig>,
    compression: bool,
    log: Option<LogConfig>,
    sites: Vec<SiteConfig>,
}

impl AppConfigBuilder {
    /// Add a listen address
    pub fn listen(mut self, address: impl Into<String>) -> Self {
        self.listen.push(ListenConfig {
            address: address.into(),
        });
        self
    }

    /// Enable or disable response compression
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Set logging configuration
    pub fn log(mut self, config: LogConfig) -> Self {
        self.log = Some(config);
        self
    }

    /// Add a site; sites are tried in the order they are added
    pub fn site(mut self, site: SiteConfig) -> Self {
        self.sites.push(site);
        self
    }

    /// Build the final AppConfig
    pub fn build(self) -> Result<AppConfig, String> {
        if self.listen.is_empty() {
            return Err("At least one listen address is required".to_string());
        }
        if self.sites.is_empty() {
            return Err("At least one site must be configured".to_string());
        }

        Ok(AppConfig {
            listen: self.listen,
            compression: self.compression,
            log: self.log.unwrap_or_default(),
            sites: self.sites,
        })
    }
}
