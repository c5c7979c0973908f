//! HTTP APIs.
//!
//! - `public`: served on the onion service. Only `/info` and `/subscribe`.
//! - `private`: loopback only, for the local operator.

use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use pub_core::SubscriptionService;

pub mod private;
pub mod public;

pub use private::create_router as private_router;
pub use public::create_router as public_router;

#[derive(Clone)]
pub struct ApiState {
    pub service: Arc<SubscriptionService>,
}

/// JSON `{"error": ...}` with `status`.
pub(crate) fn error_response(status: u16, message: impl Into<String>) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message.into() }))).into_response()
}
