use std::env;
use std::time::Duration;

use url::Url;

use crate::error::{HubError, Result};
use crate::models::SourceId;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// API server configuration
    pub api: ApiServerConfig,
    /// Proxy registry connection
    pub registry: RegistryConfig,
    /// Proxy pool and fetch executor tuning
    pub pool: ProxyPoolConfig,
    /// Upstream catalog sources
    pub sources: SourcesConfig,
    /// Proxy health prober
    pub prober: ProberConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 3000)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = any origin)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Base URL of the registry; `None` disables proxying entirely
    pub base_url: Option<String>,
    /// Collection path holding the proxy records
    pub collection: String,
    /// Optional `auth` query token
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyPoolConfig {
    /// Maximum age of the cached snapshot
    pub cache_ttl: Duration,
    /// Number of freshest proxies to pick from
    pub top_n: usize,
    /// Timeout for a request through a proxy tunnel
    pub proxy_timeout: Duration,
    /// Timeout for a direct request
    pub direct_timeout: Duration,
}

impl Default for ProxyPoolConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(30),
            top_n: 20,
            proxy_timeout: Duration::from_secs(15),
            direct_timeout: Duration::from_secs(20),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcesConfig {
    pub dramabox_base_url: String,
    pub netshort_base_url: String,
    pub melolo_base_url: String,
    /// Sources fetched through the resilient executor
    pub proxy_gated: Vec<SourceId>,
    /// Priority order of the sources, per operation
    pub order: SourceOrder,
}

/// Source priority per operation; earlier sources win deduplication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceOrder {
    pub listing: Vec<SourceId>,
    pub search: Vec<SourceId>,
    pub episodes: Vec<SourceId>,
}

impl Default for SourceOrder {
    fn default() -> Self {
        Self {
            listing: vec![SourceId::Netshort, SourceId::Dramabox, SourceId::Melolo],
            search: vec![SourceId::Dramabox, SourceId::Netshort, SourceId::Melolo],
            episodes: vec![SourceId::Melolo, SourceId::Netshort, SourceId::Dramabox],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProberConfig {
    /// Plaintext list of candidate `host:port` lines
    pub candidates_url: String,
    /// HTTPS endpoint probed through each candidate
    pub canary_url: String,
    /// Per-candidate timeout
    pub timeout: Duration,
    /// Maximum candidates probed at once
    pub concurrency: usize,
    /// Periodic probing interval; `None` = on demand only
    pub interval: Option<Duration>,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            candidates_url: DEFAULT_CANDIDATES_URL.to_string(),
            canary_url: DEFAULT_CANARY_URL.to_string(),
            timeout: Duration::from_secs(15),
            concurrency: 30,
            interval: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

const DEFAULT_DRAMABOX_URL: &str = "https://dramabox.sansekai.my.id/api/dramabox";
const DEFAULT_NETSHORT_URL: &str = "https://netshort.sansekai.my.id/api/netshort";
const DEFAULT_MELOLO_URL: &str = "https://melolo-api-azure.vercel.app/api/melolo";
const DEFAULT_CANDIDATES_URL: &str =
    "https://raw.githubusercontent.com/databay-labs/free-proxy-list/refs/heads/master/socks5.txt";
const DEFAULT_CANARY_URL: &str = "https://api.sansekai.my.id/api/flickreels/latest";

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let defaults = SourceOrder::default();

        Ok(Config {
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "3000").parse().map_err(|_| {
                    HubError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: get_env_or("CORS_ORIGINS", "")
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            registry: RegistryConfig {
                base_url: optional_url("REGISTRY_URL")?,
                collection: get_env_or("REGISTRY_COLLECTION", "proxies")
                    .trim_matches('/')
                    .to_string(),
                auth_token: optional_env("REGISTRY_AUTH"),
            },
            pool: ProxyPoolConfig {
                cache_ttl: parse_secs("PROXY_CACHE_TTL_SECS", 30)?,
                top_n: parse_number("PROXY_TOP_N", 20)?.max(1),
                proxy_timeout: parse_secs("PROXY_TIMEOUT_SECS", 15)?,
                direct_timeout: parse_secs("DIRECT_TIMEOUT_SECS", 20)?,
            },
            sources: SourcesConfig {
                dramabox_base_url: base_url("DRAMABOX_BASE_URL", DEFAULT_DRAMABOX_URL)?,
                netshort_base_url: base_url("NETSHORT_BASE_URL", DEFAULT_NETSHORT_URL)?,
                melolo_base_url: base_url("MELOLO_BASE_URL", DEFAULT_MELOLO_URL)?,
                proxy_gated: parse_sources("PROXY_GATED_SOURCES", "dramabox,netshort")?,
                order: SourceOrder {
                    listing: parse_order("LISTING_SOURCE_ORDER", defaults.listing)?,
                    search: parse_order("SEARCH_SOURCE_ORDER", defaults.search)?,
                    episodes: parse_order("EPISODE_SOURCE_ORDER", defaults.episodes)?,
                },
            },
            prober: ProberConfig {
                candidates_url: base_url("PROBE_CANDIDATES_URL", DEFAULT_CANDIDATES_URL)?,
                canary_url: base_url("PROBE_CANARY_URL", DEFAULT_CANARY_URL)?,
                timeout: parse_secs("PROBE_TIMEOUT_SECS", 15)?,
                concurrency: parse_number("PROBE_CONCURRENCY", 30)?.max(1),
                interval: match parse_number("PROBE_INTERVAL_SECS", 0)? {
                    0 => None,
                    secs => Some(Duration::from_secs(secs as u64)),
                },
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_number(key: &str, default: usize) -> Result<usize> {
    match optional_env(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| {
            HubError::InvalidConfig(format!("{} must be a non-negative integer", key))
        }),
    }
}

fn parse_secs(key: &str, default: u64) -> Result<Duration> {
    let secs = parse_number(key, default as usize)?;
    if secs == 0 {
        return Err(HubError::InvalidConfig(format!("{} must be at least 1", key)));
    }
    Ok(Duration::from_secs(secs as u64))
}

fn parse_sources(key: &str, default: &str) -> Result<Vec<SourceId>> {
    let raw = get_env_or(key, default);
    let mut sources = Vec::new();

    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let id: SourceId = name.parse().map_err(|_| {
            HubError::InvalidConfig(format!("{} has unknown source: {}", key, name))
        })?;
        if !sources.contains(&id) {
            sources.push(id);
        }
    }

    Ok(sources)
}

fn parse_order(key: &str, default: Vec<SourceId>) -> Result<Vec<SourceId>> {
    if optional_env(key).is_none() {
        return Ok(default);
    }
    parse_sources(key, "")
}

fn base_url(key: &str, default: &str) -> Result<String> {
    let raw = get_env_or(key, default);
    validate_url(key, raw.trim())
}

fn optional_url(key: &str) -> Result<Option<String>> {
    optional_env(key)
        .map(|raw| validate_url(key, &raw))
        .transpose()
}

fn validate_url(key: &str, raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| {
        HubError::InvalidConfig(format!("{} must be a valid URL: {}", key, e))
    })?;

    match url.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        other => Err(HubError::InvalidConfig(format!(
            "{} has unsupported scheme: {}",
            key, other
        ))),
    }
}

fn optional_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
