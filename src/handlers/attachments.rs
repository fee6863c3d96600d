//! Attachment upload routes: `POST /measurements/{measurementId}/attachments`
//! (pre-request) and `PUT /measurements/{measurementId}/attachments/{sessionId}`
//! (chunk/status), per §4.1.
//!
//! The path's `measurementId` is folded into the body/headers via
//! [`WithOverrides`] so a client need not repeat it in the payload.

use axum::extract::{OriginalUri, Path, State};
use axum::http::HeaderMap;
use axum::response::Response;
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::engine;
use crate::error::Result;
use crate::models::field_source::WithOverrides;
use crate::services::session_store::SessionId;
use crate::state::AppState;

async fn pre_request(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(measurement_id): Path<String>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response> {
    let source = WithOverrides::new(&body, vec![("measurementId", measurement_id)]);
    engine::handle_pre_request(&state, &headers, &uri, &source).await
}

async fn chunk_or_status(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path((measurement_id, session_id)): Path<(String, SessionId)>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Response {
    let source = WithOverrides::new(&headers, vec![("measurementId", measurement_id)]);
    engine::handle_put(&state, &headers, &source, session_id, body).await
}

pub fn attachment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(pre_request))
        .route("/{sessionId}", put(chunk_or_status))
}
