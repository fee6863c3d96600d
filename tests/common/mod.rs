//! Common test utilities and helpers.

use sensor_upload_server::{
    config::{AuthConfig, Config, LoggingConfig, RateLimitConfig, ServerConfig, StorageConfig, UploadConfig},
    create_router, AppState,
};
use std::net::TcpListener;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener as TokioTcpListener;

/// Test server instance.
pub struct TestServer {
    pub base_url: String,
    pub data_dir: TempDir,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Start a test server with auth disabled.
    pub async fn start() -> Self {
        Self::start_with_auth(false, vec![]).await
    }

    /// Start a test server with bearer-token auth configured.
    pub async fn start_with_auth(auth_enabled: bool, tokens: Vec<String>) -> Self {
        let port = get_available_port();
        let data_dir = TempDir::new().expect("failed to create temp dir");
        let base_url = format!("http://127.0.0.1:{port}");

        let config = create_test_config(&data_dir, port, &base_url, auth_enabled, tokens);
        let state = AppState::new(config).await.expect("failed to create app state");
        let app = create_router(state);

        let addr: std::net::SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
        let listener = TokioTcpListener::bind(addr).await.expect("failed to bind listener");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            tokio::select! {
                _ = axum::serve(listener, app) => {}
                _ = shutdown_rx => {}
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base_url,
            data_dir,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder().timeout(Duration::from_secs(30)).build().unwrap()
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn create_test_config(data_dir: &TempDir, port: u16, base_url: &str, auth_enabled: bool, tokens: Vec<String>) -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port,
            base_url: base_url.to_string(),
            request_timeout: 30,
            max_connections: 100,
            cleanup_interval_seconds: 3600,
        },
        storage: StorageConfig {
            data_dir: data_dir.path().to_path_buf(),
            directory_levels: 2,
        },
        upload: UploadConfig {
            max_pre_request_announced_size: 16 * 1024 * 1024,
            max_chunk_payload_size: 1024 * 1024,
            session_ttl_seconds: 3600,
            orphan_sweep_age_seconds: 86_400,
            current_format_version: 3,
        },
        rate_limit: RateLimitConfig {
            enabled: false,
            requests_per_window: 1000,
            window_seconds: 60,
            uploads_per_window: 100,
        },
        logging: LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
            file: String::new(),
        },
        auth: AuthConfig {
            enabled: auth_enabled,
            tokens,
            protected_paths: vec!["/measurements".to_string()],
            public_paths: vec!["/health".to_string()],
        },
    }
}

fn get_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("failed to bind to random port")
        .local_addr()
        .expect("failed to get local address")
        .port()
}

/// A canonical device id used throughout the integration tests.
pub fn device_id() -> String {
    "d290f1ee-6c54-4b01-90e6-d701748f0851".to_string()
}

/// A complete, valid measurement pre-request JSON body.
pub fn measurement_body(measurement_id: u64) -> serde_json::Value {
    serde_json::json!({
        "deviceId": device_id(),
        "measurementId": measurement_id.to_string(),
        "deviceType": "phone",
        "osVersion": "14",
        "appVersion": "1.2.3",
        "length": "120.5",
        "locationCount": "2",
        "startLocLat": "1",
        "startLocLon": "1",
        "startLocTS": "1",
        "endLocLat": "2",
        "endLocLon": "2",
        "endLocTS": "2",
        "modality": "BICYCLE",
        "formatVersion": "3",
    })
}
