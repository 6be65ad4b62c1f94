//! API route definitions

use axum::routing::get;
use axum::Router;

use super::handlers;
use super::server::AppState;

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", api_routes())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Catalog
        .route("/home", get(handlers::catalog::home))
        .route("/search", get(handlers::catalog::search))
        .route("/episode", get(handlers::catalog::episodes))
        .route("/stream", get(handlers::catalog::stream))
        // Proxy probing
        .route("/proxy-refresh", get(handlers::proxy_refresh::trigger_refresh))
        .route(
            "/proxy-refresh/status",
            get(handlers::proxy_refresh::refresh_status),
        )
}
