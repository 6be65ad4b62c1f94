//! API request handlers

pub mod catalog;
pub mod health;
pub mod proxy_refresh;
