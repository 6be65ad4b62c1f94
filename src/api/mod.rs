//! HTTP API
//!
//! Read-only catalog endpoints plus the proxy refresh trigger.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
