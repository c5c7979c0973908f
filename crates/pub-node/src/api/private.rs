use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tracing::warn;

use pub_core::PublicProfile;

use super::{error_response, ApiState};

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/peers", get(get_peers))
        .route("/subscribe/:onion", get(get_subscribe))
        .with_state(state)
}

/// GET /peers - every known peer's public profile
async fn get_peers(State(state): State<ApiState>) -> Response {
    match state.service.store().list_peers().await {
        Ok(peers) => {
            let profiles: Vec<PublicProfile> = peers.into_iter().map(|p| p.profile).collect();
            Json(profiles).into_response()
        }
        Err(e) => {
            warn!("failed to list peers: {}", e);
            error_response(500, e.to_string())
        }
    }
}

/// GET /subscribe/:onion - run the request flow against `onion`
async fn get_subscribe(State(state): State<ApiState>, Path(onion): Path<String>) -> Response {
    match state.service.subscribe(&onion).await {
        Ok(peer) => Json(peer.profile).into_response(),
        Err(e) => {
            warn!(peer = %onion, "subscribe failed: {}", e);
            error_response(e.status_code(), e.to_string())
        }
    }
}
