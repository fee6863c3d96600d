//! Shared application state, accessible from all handlers via axum's
//! `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::UploadError;
use crate::services::session_store::{InMemorySessionStore, SessionStore};
use crate::services::storage::{FsStorageService, StorageService};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub sessions: Arc<dyn SessionStore>,
    pub storage: Arc<dyn StorageService>,
}

impl AppState {
    pub async fn new(config: Config) -> Result<Self, UploadError> {
        let sessions = InMemorySessionStore::new(config.upload.session_ttl_seconds);
        let storage = FsStorageService::new(&config.storage).await?;

        Ok(Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            storage: Arc::new(storage),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.config.server.base_url
    }

    pub fn max_pre_request_announced_size(&self) -> u64 {
        self.config.upload.max_pre_request_announced_size
    }

    pub fn max_chunk_payload_size(&self) -> u64 {
        self.config.upload.max_chunk_payload_size
    }

    pub fn current_format_version(&self) -> u32 {
        self.config.upload.current_format_version
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.config.server.cleanup_interval_seconds)
    }

    pub fn orphan_sweep_age(&self) -> Duration {
        Duration::from_secs(self.config.upload.orphan_sweep_age_seconds)
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"<Config>")
            .field("sessions", &"<SessionStore>")
            .field("storage", &"<StorageService>")
            .finish()
    }
}
