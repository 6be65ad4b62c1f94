//! Catalog handlers: listing, search, episodes and streams

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::api::server::AppState;
use crate::error::HubError;
use crate::models::{EpisodeList, ListingResponse, SearchResult, StreamInfo};

#[derive(Debug, Deserialize, Default)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct EpisodeQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StreamQuery {
    pub vid: Option<String>,
}

/// Merged home listing
pub async fn home(State(state): State<AppState>) -> Json<ListingResponse> {
    Json(state.aggregator.listing().await.into())
}

/// Search across every source
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchResult>, HubError> {
    let q = query.q.unwrap_or_default();
    Ok(Json(state.aggregator.search(&q).await?))
}

/// Episodes of one title
pub async fn episodes(
    State(state): State<AppState>,
    Query(query): Query<EpisodeQuery>,
) -> Result<Json<EpisodeList>, HubError> {
    let id = query.id.unwrap_or_default();
    Ok(Json(state.aggregator.episodes(&id).await?))
}

/// Playback URLs for one episode stream id
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
) -> Result<Json<StreamInfo>, HubError> {
    let vid = query.vid.unwrap_or_default();
    Ok(Json(state.aggregator.resolve_stream(&vid).await?))
}
