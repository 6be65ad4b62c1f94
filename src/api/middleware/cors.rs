//! CORS middleware configuration
//!
//! The API is read-only: only GET (and the preflight OPTIONS) is allowed.
//! Without a configured whitelist any origin may read it, without
//! credentials.

use axum::http::{header, HeaderValue, Method};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

/// Create a CORS layer with the specified allowed origins
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let methods = [Method::GET, Method::OPTIONS];

    if allowed_origins.is_empty() {
        debug!("CORS: No origins specified, allowing any origin");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any);
    }

    debug!("CORS: Allowing origins: {:?}", allowed_origins);
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(origin) => Some(origin),
            Err(_) => {
                warn!("CORS: Ignoring unparsable origin {:?}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(methods)
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
}
