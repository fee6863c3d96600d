//! The upload protocol engine: pre-request, status, and chunk handling,
//! and the chunk upload state machine tying C1-C4 together (§4.5).
//!
//! This module is identifier-agnostic: the measurement and attachment
//! routes both call into these functions, differing only in how they
//! build the `FieldSource` the identifiers and metadata are read from
//! (see `handlers::measurements` / `handlers::attachments`).

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::TryStreamExt;
use uuid::Uuid;

use crate::error::{Result, UploadError};
use crate::metadata_extractor;
use crate::models::content_range::ContentRange;
use crate::models::field_source::FieldSource;
use crate::models::identifier::Identifier;
use crate::models::uploadable::Uploadable;
use crate::services::session_store::{SessionData, SessionId};
use crate::services::storage::{ByteStream, UploadMetaData};
use crate::state::AppState;

fn parse_u64_header(headers: &HeaderMap, name: &str) -> Result<u64> {
    let raw = headers
        .get(name)
        .ok_or_else(|| UploadError::unparsable(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| UploadError::unparsable(format!("{name} header is not ASCII")))?;
    raw.parse()
        .map_err(|_| UploadError::unparsable(format!("{name} header must be an integer")))
}

/// `checkBodySize(headers, limit, headerName)` (§4.5 step 1 / §4.5 chunk
/// step 2).
fn check_body_size(headers: &HeaderMap, name: &str, limit: u64) -> Result<u64> {
    let size = parse_u64_header(headers, name)?;
    if size > limit {
        return Err(UploadError::payload_too_large(format!(
            "{size} exceeds the configured limit of {limit} bytes"
        )));
    }
    Ok(size)
}

/// Builds the `Location` header contract from §4.5: embeds the session id
/// as a path segment, strips `uploadType=resumable`, preserves other query
/// parameters, and reproduces host/scheme from the original request when
/// available.
pub fn build_location_uri(original_uri: &Uri, headers: &HeaderMap, session_id: SessionId) -> String {
    let mut path = original_uri.path().trim_end_matches('/').to_string();
    path.push('/');
    path.push_str(&session_id.to_string());

    let kept_query: Vec<&str> = original_uri
        .query()
        .map(|q| q.split('&').filter(|pair| *pair != "uploadType=resumable").collect())
        .unwrap_or_default();

    if !kept_query.is_empty() {
        path.push('?');
        path.push_str(&kept_query.join("&"));
    }

    match headers.get("host").and_then(|v| v.to_str().ok()) {
        Some(host) => {
            let scheme = headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("http");
            format!("{scheme}://{host}{path}")
        }
        None => path,
    }
}

fn empty_with_status(status: StatusCode) -> Response {
    (status, [("content-length", "0")]).into_response()
}

fn resume_incomplete(range: Option<u64>) -> Response {
    match range {
        Some(n) if n > 0 => (
            StatusCode::PERMANENT_REDIRECT,
            [("range", format!("bytes=0-{}", n - 1)), ("content-length".to_string(), "0".to_string())],
        )
            .into_response(),
        _ => empty_with_status(StatusCode::PERMANENT_REDIRECT),
    }
}

fn created() -> Response {
    empty_with_status(StatusCode::CREATED)
}

fn conflict_created_for_winner() -> Response {
    // A concurrent request already finalized this identifier's object;
    // the client's data is durably stored either way (§4.5).
    empty_with_status(StatusCode::CONFLICT)
}

/// The pre-request handler (§4.5): validates the announced size, builds
/// and validates the `Uploadable`, checks for conflicts against durable
/// storage, then binds a fresh session.
pub async fn handle_pre_request(
    state: &AppState,
    headers: &HeaderMap,
    original_uri: &Uri,
    source: &dyn FieldSource,
) -> Result<Response> {
    check_body_size(headers, "x-upload-content-length", state.max_pre_request_announced_size())?;

    let uploadable = metadata_extractor::extract(source, state.current_format_version())?;
    uploadable.check_conflict(state.storage.as_ref()).await?;

    let session_id = state.sessions.create(uploadable.bind_to()).await;
    let location = build_location_uri(original_uri, headers, session_id);

    Ok((
        StatusCode::OK,
        [("location", location), ("content-length".to_string(), "0".to_string())],
    )
        .into_response())
}

/// Entry point for the combined chunk/status route (`PUT .../{sessionId}`):
/// resolves and validates the session against the request's identifiers,
/// then dispatches on `Content-Length` per §4.5.
pub async fn handle_put(
    state: &AppState,
    headers: &HeaderMap,
    source: &dyn FieldSource,
    session_id: SessionId,
    body: Body,
) -> Response {
    match try_handle_put(state, headers, source, session_id, body).await {
        Ok(response) => response,
        Err(err) => {
            if err.destroys_session() {
                if matches!(err, UploadError::PayloadTooLarge(_)) {
                    if let Some(session) = state.sessions.get(session_id).await {
                        if let Some(upload_path) = session.upload_path {
                            state.storage.cleanup_upload(upload_path).await.ok();
                        }
                    }
                }
                state.sessions.destroy(session_id).await;
            }
            err.into_response()
        }
    }
}

async fn try_handle_put(
    state: &AppState,
    headers: &HeaderMap,
    source: &dyn FieldSource,
    session_id: SessionId,
    body: Body,
) -> Result<Response> {
    let content_length = parse_u64_header(headers, "content-length")?;

    let session = match state.sessions.get(session_id).await {
        Some(session) if session.has_identifiers() => session,
        _ => return Err(UploadError::session_expired("no bound session for this request")),
    };

    if content_length == 0 {
        // Status requests carry only the identifier triple (§6); the full
        // metadata bundle `extract` demands is not guaranteed to be present.
        let identifier = metadata_extractor::parse_identifier(source)?;
        if !session.matches(&identifier) {
            return Err(UploadError::illegal_session(
                "request identifiers do not match the session's bound identifiers",
            ));
        }
        return handle_status(state, headers, session_id, session, identifier).await;
    }

    let uploadable = metadata_extractor::extract(source, state.current_format_version())?;
    if !session.matches(&uploadable.identifier) {
        return Err(UploadError::illegal_session(
            "request identifiers do not match the session's bound identifiers",
        ));
    }

    handle_chunk(state, headers, session_id, session, uploadable, content_length, body).await
}

async fn handle_status(
    state: &AppState,
    headers: &HeaderMap,
    session_id: SessionId,
    session: SessionData,
    identifier: Identifier,
) -> Result<Response> {
    let header = headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| UploadError::unparsable("missing Content-Range header"))?;
    ContentRange::parse_status_total(header)?;

    if state.storage.has_object(&identifier).await? {
        return Ok(empty_with_status(StatusCode::OK));
    }

    match session.upload_path {
        None => Ok(resume_incomplete(None)),
        Some(upload_path) => match state.storage.bytes_uploaded(upload_path).await {
            Ok(n) => Ok(resume_incomplete(Some(n))),
            Err(crate::error::StorageError::UnknownUploadPath) => {
                state.sessions.remove_upload_path(session_id).await;
                Ok(resume_incomplete(None))
            }
            Err(other) => Err(other.into()),
        },
    }
}

async fn handle_chunk(
    state: &AppState,
    headers: &HeaderMap,
    session_id: SessionId,
    session: SessionData,
    uploadable: Uploadable,
    content_length: u64,
    body: Body,
) -> Result<Response> {
    if content_length > state.max_chunk_payload_size() {
        return Err(UploadError::payload_too_large(format!(
            "{content_length} exceeds the configured chunk limit of {} bytes",
            state.max_chunk_payload_size()
        )));
    }

    let header = headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| UploadError::unparsable("missing Content-Range header"))?;
    let cr = ContentRange::parse_chunk(header)?;
    cr.check_body_len(content_length)?;

    match (session.upload_path, cr.from) {
        (None, from) if from != 0 => Err(UploadError::unexpected_content_range(
            "client resumes but the server holds no upload state",
        )),
        (Some(_), 0) => Err(UploadError::unexpected_content_range(
            "server believes bytes already exist for this upload",
        )),
        (None, 0) => begin_fresh_upload(state, session_id, uploadable.identifier, cr, body).await,
        (Some(upload_path), from) => match state.storage.bytes_uploaded(upload_path).await {
            Ok(n) if from == n => write_and_advance(state, session_id, uploadable.identifier, upload_path, cr, body).await,
            Ok(n) => Ok(resume_incomplete(Some(n))),
            Err(crate::error::StorageError::UnknownUploadPath) => {
                state.sessions.remove_upload_path(session_id).await;
                begin_fresh_upload(state, session_id, uploadable.identifier, cr, body).await
            }
            Err(other) => Err(other.into()),
        },
    }
}

async fn begin_fresh_upload(
    state: &AppState,
    session_id: SessionId,
    identifier: Identifier,
    cr: ContentRange,
    body: Body,
) -> Result<Response> {
    let upload_path = state.storage.begin_upload(identifier, cr.total).await?;

    let mut session = state.sessions.get(session_id).await.unwrap_or_default();
    session.upload_path = Some(upload_path);
    state.sessions.put(session_id, session).await;

    write_and_advance(state, session_id, identifier, upload_path, cr, body).await
}

async fn write_and_advance(
    state: &AppState,
    session_id: SessionId,
    identifier: Identifier,
    upload_path: Uuid,
    cr: ContentRange,
    body: Body,
) -> Result<Response> {
    let stream: ByteStream = Box::pin(
        body.into_data_stream()
            .map_err(|err| std::io::Error::other(err.to_string())),
    );
    let new_size = state.storage.write_chunk(upload_path, stream).await?;

    if new_size < cr.total {
        return Ok(resume_incomplete(Some(new_size)));
    }

    match state
        .storage
        .finalize(upload_path, UploadMetaData { identifier, total_size: cr.total })
        .await
    {
        Ok(()) => {
            state.sessions.remove_upload_path(session_id).await;
            Ok(created())
        }
        Err(crate::error::StorageError::AlreadyExists) => {
            state.sessions.remove_upload_path(session_id).await;
            Ok(conflict_created_for_winner())
        }
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in pairs {
            headers.insert(
                axum::http::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                value.parse().unwrap(),
            );
        }
        headers
    }

    #[test]
    fn location_uri_embeds_session_and_strips_resumable_marker() {
        let uri: Uri = "/measurements?uploadType=resumable&foo=bar".parse().unwrap();
        let headers = headers_with(&[("host", "upload.example.com")]);
        let session_id = Uuid::new_v4();
        let location = build_location_uri(&uri, &headers, session_id);
        assert!(location.starts_with("http://upload.example.com/measurements/"));
        assert!(location.contains(&session_id.to_string()));
        assert!(location.contains("foo=bar"));
        assert!(!location.contains("uploadType"));
    }

    #[test]
    fn location_uri_honors_forwarded_proto() {
        let uri: Uri = "/measurements".parse().unwrap();
        let headers = headers_with(&[("host", "upload.example.com"), ("x-forwarded-proto", "https")]);
        let location = build_location_uri(&uri, &headers, Uuid::new_v4());
        assert!(location.starts_with("https://"));
    }

    #[test]
    fn location_uri_is_relative_without_host_header() {
        let uri: Uri = "/measurements".parse().unwrap();
        let headers = HeaderMap::new();
        let location = build_location_uri(&uri, &headers, Uuid::new_v4());
        assert!(location.starts_with("/measurements/"));
    }

    #[test]
    fn body_size_check_rejects_oversized_announcement() {
        let headers = headers_with(&[("x-upload-content-length", "2048")]);
        let err = check_body_size(&headers, "x-upload-content-length", 1024).unwrap_err();
        assert!(matches!(err, UploadError::PayloadTooLarge(_)));
    }

    #[test]
    fn body_size_check_rejects_non_integer() {
        let headers = headers_with(&[("x-upload-content-length", "nope")]);
        assert!(check_body_size(&headers, "x-upload-content-length", 1024).is_err());
    }
}
