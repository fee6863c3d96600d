//! `ObjectIndex`: the durable record of completed uploads (§4.4, §5).
//!
//! Keyed by [`Identifier::storage_key`]. Backed by RocksDB, following the
//! same column-family-plus-`WriteBatch` approach the original database
//! service uses for its media/session tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamilyDescriptor, DBWithThreadMode, MultiThreaded, Options, WriteBatch};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageError;
use crate::models::identifier::Identifier;

type DB = DBWithThreadMode<MultiThreaded>;
type StorageResult<T> = Result<T, StorageError>;

const CF_OBJECTS: &str = "objects";
const CF_UPLOADS: &str = "uploads";

/// A completed, durably stored uploadable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub storage_key: String,
    pub object_id: Uuid,
    pub size: u64,
    pub stored_at: DateTime<Utc>,
}

/// An in-progress upload handle (`uploadPath`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_path: Uuid,
    pub storage_key: String,
    pub total_size: u64,
    pub created_at: DateTime<Utc>,
}

pub struct ObjectIndex {
    db: Arc<DB>,
    #[allow(dead_code)]
    db_path: PathBuf,
}

impl std::fmt::Debug for ObjectIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectIndex").field("path", &self.db_path).finish()
    }
}

impl ObjectIndex {
    pub fn open(path: &Path) -> StorageResult<Self> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(256);
        opts.set_keep_log_file_num(3);

        let cf_descriptors = [CF_OBJECTS, CF_UPLOADS]
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Lz4);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
        tracing::info!(path = %path.display(), "object index initialized (RocksDB)");

        Ok(Self {
            db: Arc::new(db),
            db_path: path.to_path_buf(),
        })
    }

    fn cf_objects(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db.cf_handle(CF_OBJECTS).expect("CF objects must exist")
    }

    fn cf_uploads(&self) -> Arc<rocksdb::BoundColumnFamily<'_>> {
        self.db.cf_handle(CF_UPLOADS).expect("CF uploads must exist")
    }

    pub fn has_object(&self, identifier: &Identifier) -> StorageResult<bool> {
        Ok(self
            .db
            .get_cf(&self.cf_objects(), identifier.storage_key().as_bytes())?
            .is_some())
    }

    pub fn get_object(&self, identifier: &Identifier) -> StorageResult<Option<ObjectRecord>> {
        match self.db.get_cf(&self.cf_objects(), identifier.storage_key().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_upload(&self, record: &UploadRecord) -> StorageResult<()> {
        let data = serde_json::to_vec(record)?;
        self.db
            .put_cf(&self.cf_uploads(), record.upload_path.to_string().as_bytes(), data)?;
        Ok(())
    }

    pub fn get_upload(&self, upload_path: Uuid) -> StorageResult<Option<UploadRecord>> {
        match self.db.get_cf(&self.cf_uploads(), upload_path.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn delete_upload(&self, upload_path: Uuid) -> StorageResult<()> {
        self.db.delete_cf(&self.cf_uploads(), upload_path.to_string().as_bytes())?;
        Ok(())
    }

    /// Atomically commit an object record and drop its upload record, but
    /// only if no object is already stored under this key (§4.4, I4). The
    /// caller is expected to additionally hold a per-identifier lock so
    /// the read-then-write here is race-free across concurrent finalizers
    /// on the same process; this check also guards against any gap that
    /// slips past that lock.
    pub fn commit_if_absent(&self, object: &ObjectRecord, upload_path: Uuid) -> StorageResult<()> {
        if self.has_object_by_key(&object.storage_key)? {
            return Err(StorageError::AlreadyExists);
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.cf_objects(),
            object.storage_key.as_bytes(),
            serde_json::to_vec(object)?,
        );
        batch.delete_cf(&self.cf_uploads(), upload_path.to_string().as_bytes());
        self.db.write(batch)?;
        Ok(())
    }

    fn has_object_by_key(&self, storage_key: &str) -> StorageResult<bool> {
        Ok(self.db.get_cf(&self.cf_objects(), storage_key.as_bytes())?.is_some())
    }

    /// All upload records older than `max_age_secs`, for orphan sweeping.
    pub fn stale_uploads(&self, max_age_secs: u64) -> StorageResult<Vec<UploadRecord>> {
        let cutoff = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
            .saturating_sub(max_age_secs);

        let mut stale = Vec::new();
        for item in self.db.iterator_cf(&self.cf_uploads(), rocksdb::IteratorMode::Start) {
            let (_, value) = item?;
            let record: UploadRecord = serde_json::from_slice(&value)?;
            if (record.created_at.timestamp() as u64) < cutoff {
                stale.push(record);
            }
        }
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::identifier::{DeviceId, MeasurementId};

    fn identifier() -> Identifier {
        Identifier::Measurement {
            device_id: DeviceId::parse("d290f1ee-6c54-4b01-90e6-d701748f0851").unwrap(),
            measurement_id: MeasurementId(1),
        }
    }

    #[test]
    fn commit_if_absent_rejects_duplicate_objects() {
        let dir = tempfile::tempdir().unwrap();
        let index = ObjectIndex::open(dir.path()).unwrap();
        let identifier = identifier();
        let upload_path = Uuid::new_v4();

        index
            .put_upload(&UploadRecord {
                upload_path,
                storage_key: identifier.storage_key(),
                total_size: 10,
                created_at: Utc::now(),
            })
            .unwrap();

        let record = ObjectRecord {
            storage_key: identifier.storage_key(),
            object_id: upload_path,
            size: 10,
            stored_at: Utc::now(),
        };
        index.commit_if_absent(&record, upload_path).unwrap();
        assert!(index.has_object(&identifier).unwrap());
        assert!(index.get_upload(upload_path).unwrap().is_none());

        let err = index.commit_if_absent(&record, upload_path).unwrap_err();
        assert!(matches!(err, StorageError::AlreadyExists));
    }
}
