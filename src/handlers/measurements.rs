//! Measurement upload routes: `POST /measurements` (pre-request) and
//! `PUT /measurements/{sessionId}` (chunk/status), per §4.1.

use axum::extract::{OriginalUri, Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{post, put};
use axum::{Json, Router};
use serde_json::Value;

use crate::auth::AuthenticatedUser;
use crate::engine;
use crate::error::Result;
use crate::services::session_store::SessionId;
use crate::state::AppState;

async fn pre_request(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response> {
    engine::handle_pre_request(&state, &headers, &uri, &body).await
}

async fn chunk_or_status(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Path(session_id): Path<SessionId>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Response {
    engine::handle_put(&state, &headers, &headers, session_id, body).await
}

pub fn measurement_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(pre_request))
        .route("/{sessionId}", put(chunk_or_status))
}
