//! Attachment upload and bearer-auth integration tests.

mod common;

use common::{measurement_body, TestServer};

fn session_id_from_location(location: &str) -> &str {
    location.rsplit('/').next().unwrap()
}

async fn upload_measurement(server: &TestServer, measurement_id: u64) {
    let client = server.client();
    let pre = client
        .post(server.url("/measurements"))
        .header("x-upload-content-length", "5")
        .json(&measurement_body(measurement_id))
        .send()
        .await
        .unwrap();
    let location = pre.headers().get("location").unwrap().to_str().unwrap().to_string();
    let session_id = session_id_from_location(&location);

    let body = measurement_body(measurement_id);
    let mut headers = reqwest::header::HeaderMap::new();
    for (key, value) in body.as_object().unwrap() {
        headers.insert(
            reqwest::header::HeaderName::from_bytes(key.as_bytes()).unwrap(),
            value.as_str().unwrap().parse().unwrap(),
        );
    }
    headers.insert("content-range", "bytes 0-4/5".parse().unwrap());

    let chunk = client
        .put(server.url(&format!("/measurements/{session_id}")))
        .headers(headers)
        .body(b"hello".to_vec())
        .send()
        .await
        .unwrap();
    assert_eq!(chunk.status(), 201);
}

fn attachment_body() -> serde_json::Value {
    serde_json::json!({
        "deviceId": common::device_id(),
        "deviceType": "phone",
        "osVersion": "14",
        "appVersion": "1.2.3",
        "logCount": "1",
        "imageCount": "0",
        "videoCount": "0",
        "filesSize": "3",
        "formatVersion": "3",
        "attachmentId": "1",
    })
}

#[tokio::test]
async fn attachment_pre_request_without_parent_measurement_fails() {
    let server = TestServer::start().await;
    let client = server.client();

    let response = client
        .post(server.url("/measurements/42/attachments"))
        .header("x-upload-content-length", "3")
        .json(&attachment_body())
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
}

#[tokio::test]
async fn attachment_upload_succeeds_after_parent_measurement_exists() {
    let server = TestServer::start().await;
    upload_measurement(&server, 42).await;

    let client = server.client();
    let pre = client
        .post(server.url("/measurements/42/attachments"))
        .header("x-upload-content-length", "3")
        .json(&attachment_body())
        .send()
        .await
        .unwrap();

    assert_eq!(pre.status(), 200);
    let location = pre.headers().get("location").unwrap().to_str().unwrap().to_string();
    let session_id = session_id_from_location(&location);

    let body = attachment_body();
    let mut headers = reqwest::header::HeaderMap::new();
    for (key, value) in body.as_object().unwrap() {
        headers.insert(
            reqwest::header::HeaderName::from_bytes(key.as_bytes()).unwrap(),
            value.as_str().unwrap().parse().unwrap(),
        );
    }
    headers.insert("content-range", "bytes 0-2/3".parse().unwrap());

    let chunk = client
        .put(server.url(&format!("/measurements/42/attachments/{session_id}")))
        .headers(headers)
        .body(b"log".to_vec())
        .send()
        .await
        .unwrap();

    assert_eq!(chunk.status(), 201);
}

#[tokio::test]
async fn bearer_auth_rejects_missing_token() {
    let server = TestServer::start_with_auth(true, vec!["secret-token".to_string()]).await;
    let client = server.client();

    let response = client
        .post(server.url("/measurements"))
        .header("x-upload-content-length", "5")
        .json(&measurement_body(1))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn bearer_auth_accepts_valid_token() {
    let server = TestServer::start_with_auth(true, vec!["secret-token".to_string()]).await;
    let client = server.client();

    let response = client
        .post(server.url("/measurements"))
        .header("x-upload-content-length", "5")
        .header("authorization", "Bearer secret-token")
        .json(&measurement_body(1))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn bearer_auth_does_not_guard_health_endpoint() {
    let server = TestServer::start_with_auth(true, vec!["secret-token".to_string()]).await;
    let client = server.client();

    let response = client.get(server.url("/health/live")).send().await.unwrap();
    assert_eq!(response.status(), 200);
}
