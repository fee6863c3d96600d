//! The `SessionStore` contract (§4.3) and its in-memory implementation.
//!
//! A session is a generic `get`/`put`/`remove`/`destroy` capability in
//! principle, but the only fields a session ever carries are
//! `deviceId`/`measurementId`/`attachmentId`/`uploadPath` (§3), so this
//! implementation narrows the contract to a single typed record per
//! session id rather than an untyped map — see DESIGN.md's "Open Question
//! decisions" for the rationale.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::models::identifier::{AttachmentId, DeviceId, Identifier, MeasurementId};

pub type SessionId = Uuid;

/// Everything a session may hold, per §3.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionData {
    pub device_id: Option<DeviceId>,
    pub measurement_id: Option<MeasurementId>,
    pub attachment_id: Option<AttachmentId>,
    pub upload_path: Option<Uuid>,
}

impl SessionData {
    pub fn from_identifier(identifier: Identifier) -> Self {
        Self {
            device_id: Some(identifier.device_id()),
            measurement_id: Some(identifier.measurement_id()),
            attachment_id: identifier.attachment_id(),
            upload_path: None,
        }
    }

    /// I1: a session carries identifiers only once a pre-request has
    /// bound them.
    pub fn has_identifiers(&self) -> bool {
        self.device_id.is_some()
    }

    /// I2: the bound identifiers must match the identifiers of a
    /// subsequent chunk/status request on this session.
    pub fn matches(&self, identifier: &Identifier) -> bool {
        self.device_id == Some(identifier.device_id())
            && self.measurement_id == Some(identifier.measurement_id())
            && self.attachment_id == identifier.attachment_id()
    }
}

/// Per-client session container (§4.3). Implementations must be safe for
/// concurrent use across sessions; callers are responsible for serializing
/// operations on a single session id (§5).
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create a session already bound to `data`, returning its id.
    async fn create(&self, data: SessionData) -> SessionId;

    /// Read a session's data. `None` if unknown or expired (sentinel-null
    /// read, per §3's TTL note).
    async fn get(&self, id: SessionId) -> Option<SessionData>;

    /// Overwrite a session's data. Returns `false` if the session is
    /// unknown or expired.
    async fn put(&self, id: SessionId, data: SessionData) -> bool;

    /// Clear only the `uploadPath` field, leaving the rest of the session
    /// intact (used on successful completion and on orphan recovery).
    async fn remove_upload_path(&self, id: SessionId);

    /// Destroy a session outright (used on fatal client-side errors).
    async fn destroy(&self, id: SessionId);

    /// Sweep and return ids of sessions whose TTL has elapsed.
    async fn sweep_expired(&self) -> Vec<SessionId>;
}

/// In-memory `SessionStore`, backed by the same concurrent-map primitive
/// the rate limiter uses for its per-IP state.
pub struct InMemorySessionStore {
    sessions: DashMap<SessionId, (SessionData, Instant)>,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, data: SessionData) -> SessionId {
        let id = Uuid::new_v4();
        self.sessions.insert(id, (data, Instant::now() + self.ttl));
        id
    }

    async fn get(&self, id: SessionId) -> Option<SessionData> {
        let entry = self.sessions.get(&id)?;
        let (data, expires_at) = *entry.value();
        if Instant::now() > expires_at {
            drop(entry);
            self.sessions.remove(&id);
            return None;
        }
        Some(data)
    }

    async fn put(&self, id: SessionId, data: SessionData) -> bool {
        match self.sessions.get_mut(&id) {
            Some(mut entry) => {
                if Instant::now() > entry.1 {
                    drop(entry);
                    self.sessions.remove(&id);
                    return false;
                }
                entry.0 = data;
                true
            }
            None => false,
        }
    }

    async fn remove_upload_path(&self, id: SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.0.upload_path = None;
        }
    }

    async fn destroy(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    async fn sweep_expired(&self) -> Vec<SessionId> {
        let now = Instant::now();
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| now > entry.value().1)
            .map(|entry| *entry.key())
            .collect();
        for id in &expired {
            self.sessions.remove(id);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_id() -> DeviceId {
        DeviceId::parse("d290f1ee-6c54-4b01-90e6-d701748f0851").unwrap()
    }

    #[tokio::test]
    async fn create_and_get_roundtrip() {
        let store = InMemorySessionStore::new(3600);
        let identifier = Identifier::Measurement {
            device_id: device_id(),
            measurement_id: MeasurementId(1),
        };
        let id = store.create(SessionData::from_identifier(identifier)).await;
        let data = store.get(id).await.unwrap();
        assert!(data.has_identifiers());
        assert!(data.matches(&identifier));
    }

    #[tokio::test]
    async fn remove_upload_path_keeps_identifiers() {
        let store = InMemorySessionStore::new(3600);
        let identifier = Identifier::Measurement {
            device_id: device_id(),
            measurement_id: MeasurementId(1),
        };
        let id = store.create(SessionData::from_identifier(identifier)).await;
        let mut data = store.get(id).await.unwrap();
        data.upload_path = Some(Uuid::new_v4());
        store.put(id, data).await;

        store.remove_upload_path(id).await;
        let data = store.get(id).await.unwrap();
        assert!(data.upload_path.is_none());
        assert!(data.has_identifiers());
    }

    #[tokio::test]
    async fn destroy_removes_session_entirely() {
        let store = InMemorySessionStore::new(3600);
        let id = store.create(SessionData::default()).await;
        store.destroy(id).await;
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn expired_sessions_read_as_sentinel_null() {
        let store = InMemorySessionStore::new(0);
        let id = store.create(SessionData::default()).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn put_on_unknown_session_fails() {
        let store = InMemorySessionStore::new(3600);
        assert!(!store.put(Uuid::new_v4(), SessionData::default()).await);
    }
}
