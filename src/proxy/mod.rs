//! Proxy layer
//!
//! This module provides:
//! - A TTL-cached pool of alive SOCKS5 proxies backed by the registry
//! - Resilient fetching (one proxy attempt, then direct)
//! - The prober that validates public candidates and feeds the registry

pub mod clock;
pub mod executor;
pub mod pool;
pub mod prober;
pub mod transport;

pub use clock::{Clock, SystemClock};
pub use executor::ResilientFetcher;
pub use pool::{PoolStatus, ProxyPool};
pub use prober::{ProbeReport, ProxyProber};
pub use transport::{browser_headers, HttpTransport, ReqwestTransport, Route};
