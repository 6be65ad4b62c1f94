//! Dramahub - Short-Drama Catalog Aggregator
//!
//! Merges several short-drama catalog APIs behind one read-only HTTP API.
//!
//! ## Features
//!
//! - Home listing, search and episode lookup merged across sources
//! - Per-source failure flags instead of whole-request failures
//! - SOCKS5 proxy pool with a direct-request fallback for gated sources
//! - Background prober that keeps the proxy registry up to date

pub mod aggregate;
pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;
pub mod registry;
pub mod services;
pub mod sources;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{HubError, Result};
