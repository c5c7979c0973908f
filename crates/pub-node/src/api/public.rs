use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::debug;

use pub_core::transport::{INFO_PATH, PEER_HEADER, SUBSCRIBE_PATH};

use super::{error_response, ApiState};

pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route(INFO_PATH, get(get_info))
        .route(SUBSCRIBE_PATH, post(post_subscribe))
        .with_state(state)
}

/// GET /info - our public profile
async fn get_info(State(state): State<ApiState>) -> Response {
    Json(state.service.identity().profile().clone()).into_response()
}

/// POST /subscribe - accept a sealed subscribe request
async fn post_subscribe(State(state): State<ApiState>, headers: HeaderMap, body: Bytes) -> Response {
    let sender = match headers.get(PEER_HEADER).and_then(|v| v.to_str().ok()) {
        Some(sender) if !sender.is_empty() => sender.to_string(),
        _ => return error_response(400, "missing Peer header"),
    };

    match state.service.accept(&sender, &body).await {
        Ok(peer) => Json(peer.profile).into_response(),
        Err(e) => {
            debug!(peer = %sender, status = e.status_code(), "subscribe request failed");
            error_response(e.status_code(), e.public_reason())
        }
    }
}
