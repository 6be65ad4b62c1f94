//! Proxy probe trigger and status

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::HubError;
use crate::services::{ProbeStatus, TriggerOutcome};

/// Queue a probe run; never waits for it
pub async fn trigger_refresh(State(state): State<AppState>) -> Result<impl IntoResponse, HubError> {
    let status = match state.prober.trigger()? {
        TriggerOutcome::Queued => "Proxy refresh started",
        TriggerOutcome::AlreadyQueued => "Proxy refresh already queued",
    };
    info!("{}", status);

    Ok((StatusCode::ACCEPTED, Json(json!({ "status": status }))))
}

/// Latest probe status
pub async fn refresh_status(State(state): State<AppState>) -> Json<ProbeStatus> {
    Json(state.prober.status())
}
