//! Durable object storage (§4.4, §5).
//!
//! Chunk bytes land in a sharded temp directory keyed by `uploadPath`; once
//! a chunk upload completes, the temp file is committed into the object
//! directory and indexed by [`ObjectIndex`] under the identifier's storage
//! key. Directory sharding follows the original media server's hex-prefix
//! scheme, just keyed by `uploadPath` instead of a media id.

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use futures::{Stream, StreamExt};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::models::identifier::Identifier;
use crate::services::object_index::{ObjectIndex, ObjectRecord, UploadRecord};

type StorageResult<T> = Result<T, StorageError>;

/// A boxed byte stream, used so `StorageService` can remain object-safe
/// (an `impl Stream` parameter would not be).
pub type ByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// What the engine knows about an uploadable when it asks storage to
/// finalize a chunked upload.
#[derive(Debug, Clone, Copy)]
pub struct UploadMetaData {
    pub identifier: Identifier,
    pub total_size: u64,
}

/// Durable object storage and the temp-file lifecycle of a chunked upload.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Whether a durable object already exists for `identifier`.
    async fn has_object(&self, identifier: &Identifier) -> StorageResult<bool>;

    /// Allocate a new upload handle for `identifier`, announced to be
    /// `total_size` bytes once complete.
    async fn begin_upload(&self, identifier: Identifier, total_size: u64) -> StorageResult<Uuid>;

    /// Bytes written to `upload_path` so far. `StorageError::UnknownUploadPath`
    /// if the handle is unknown (expired, cleaned, or never existed).
    async fn bytes_uploaded(&self, upload_path: Uuid) -> StorageResult<u64>;

    /// Append a chunk to `upload_path`, returning the new total size.
    async fn write_chunk(&self, upload_path: Uuid, data: ByteStream) -> StorageResult<u64>;

    /// Commit the temp file at `upload_path` as the durable object for
    /// `meta.identifier`. Fails with `StorageError::AlreadyExists` if a
    /// concurrent request already committed an object for the same
    /// identifier (§4.4, I4).
    async fn finalize(&self, upload_path: Uuid, meta: UploadMetaData) -> StorageResult<()>;

    /// Discard an in-progress upload's temp state without committing it.
    async fn cleanup_upload(&self, upload_path: Uuid) -> StorageResult<()>;

    /// Discard upload handles older than `max_age`, returning how many
    /// were swept.
    async fn sweep_orphans(&self, max_age: Duration) -> StorageResult<usize>;
}

pub struct FsStorageService {
    objects_dir: PathBuf,
    temp_dir: PathBuf,
    directory_levels: u8,
    index: ObjectIndex,
    finalize_locks: DashMap<String, Arc<AsyncMutex<()>>>,
}

impl FsStorageService {
    pub async fn new(config: &StorageConfig) -> StorageResult<Self> {
        let objects_dir = config.objects_path();
        let temp_dir = config.temp_path();

        for dir in [&objects_dir, &temp_dir] {
            fs::create_dir_all(dir).await?;
        }

        let index = ObjectIndex::open(&config.database_path())?;

        tracing::info!(
            objects = %objects_dir.display(),
            temp = %temp_dir.display(),
            directory_levels = config.directory_levels,
            "storage service initialized"
        );

        Ok(Self {
            objects_dir,
            temp_dir,
            directory_levels: config.directory_levels,
            index,
            finalize_locks: DashMap::new(),
        })
    }

    fn subdir_path(&self, id: Uuid) -> PathBuf {
        if self.directory_levels == 0 {
            return PathBuf::new();
        }
        let hex = id.as_simple().to_string();
        let mut path = PathBuf::new();
        for level in 0..self.directory_levels.min(4) {
            let start = (level as usize) * 2;
            let end = start + 2;
            if end <= hex.len() {
                path.push(&hex[start..end]);
            }
        }
        path
    }

    fn temp_path(&self, upload_path: Uuid) -> PathBuf {
        self.temp_dir.join(self.subdir_path(upload_path)).join(upload_path.to_string())
    }

    fn object_path(&self, object_id: Uuid) -> PathBuf {
        self.objects_dir.join(self.subdir_path(object_id)).join(object_id.to_string())
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    fn lock_for(&self, storage_key: &str) -> Arc<AsyncMutex<()>> {
        self.finalize_locks
            .entry(storage_key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

#[async_trait]
impl StorageService for FsStorageService {
    async fn has_object(&self, identifier: &Identifier) -> StorageResult<bool> {
        self.index.has_object(identifier)
    }

    async fn begin_upload(&self, identifier: Identifier, total_size: u64) -> StorageResult<Uuid> {
        let upload_path = Uuid::new_v4();
        let temp_path = self.temp_path(upload_path);
        Self::ensure_parent(&temp_path).await?;
        fs::File::create(&temp_path).await?;

        self.index.put_upload(&UploadRecord {
            upload_path,
            storage_key: identifier.storage_key(),
            total_size,
            created_at: Utc::now(),
        })?;

        Ok(upload_path)
    }

    async fn bytes_uploaded(&self, upload_path: Uuid) -> StorageResult<u64> {
        if self.index.get_upload(upload_path)?.is_none() {
            return Err(StorageError::UnknownUploadPath);
        }
        let metadata = fs::metadata(self.temp_path(upload_path)).await?;
        Ok(metadata.len())
    }

    async fn write_chunk(&self, upload_path: Uuid, mut data: ByteStream) -> StorageResult<u64> {
        if self.index.get_upload(upload_path)?.is_none() {
            return Err(StorageError::UnknownUploadPath);
        }

        let temp_path = self.temp_path(upload_path);
        let mut file = fs::OpenOptions::new().append(true).open(&temp_path).await?;

        while let Some(bytes) = data.next().await {
            file.write_all(&bytes?).await?;
        }
        file.flush().await?;

        Ok(fs::metadata(&temp_path).await?.len())
    }

    async fn finalize(&self, upload_path: Uuid, meta: UploadMetaData) -> StorageResult<()> {
        let storage_key = meta.identifier.storage_key();
        let lock = self.lock_for(&storage_key);
        let _guard = lock.lock().await;

        if self.index.get_upload(upload_path)?.is_none() {
            return Err(StorageError::UnknownUploadPath);
        }

        let temp_path = self.temp_path(upload_path);
        let object_path = self.object_path(upload_path);
        Self::ensure_parent(&object_path).await?;

        let size = fs::metadata(&temp_path).await?.len();

        let record = ObjectRecord {
            storage_key: storage_key.clone(),
            object_id: upload_path,
            size,
            stored_at: Utc::now(),
        };

        match self.index.commit_if_absent(&record, upload_path) {
            Ok(()) => {
                fs::rename(&temp_path, &object_path).await?;
                Ok(())
            }
            Err(StorageError::AlreadyExists) => {
                fs::remove_file(&temp_path).await.ok();
                self.index.delete_upload(upload_path).ok();
                Err(StorageError::AlreadyExists)
            }
            Err(other) => Err(other),
        }
    }

    async fn cleanup_upload(&self, upload_path: Uuid) -> StorageResult<()> {
        let temp_path = self.temp_path(upload_path);
        if temp_path.exists() {
            fs::remove_file(&temp_path).await?;
        }
        self.index.delete_upload(upload_path)?;
        Ok(())
    }

    async fn sweep_orphans(&self, max_age: Duration) -> StorageResult<usize> {
        let stale = self.index.stale_uploads(max_age.as_secs())?;
        let count = stale.len();
        for record in stale {
            self.cleanup_upload(record.upload_path).await.ok();
        }
        Ok(count)
    }
}
