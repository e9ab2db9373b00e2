//! Local filesystem blob storage implementation
//!
//! Objects live under `<base>/objects/<path>`; a JSON sidecar under
//! `<base>/meta/<path>.json` keeps the content type, visibility and md5 etag.
//! Writes are staged in the temp directory and renamed into place, so readers
//! never observe a partially written object.

use crate::config::StorageConfig;
use crate::storage::{
    validate_object_path, BlobStore, ObjectHead, PutObject, StorageError, StorageResult,
    Visibility, DEFAULT_CONTENT_TYPE,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct ObjectSidecar {
    size: u64,
    content_type: String,
    visibility: Visibility,
    etag: String,
    stored_at: DateTime<Utc>,
}

/// Local filesystem blob storage implementation
pub struct LocalBlobStore {
    objects_path: PathBuf,
    meta_path: PathBuf,
    temp_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(config: &StorageConfig) -> StorageResult<Self> {
        let base = PathBuf::from(&config.base_path);
        let store = Self {
            objects_path: base.join("objects"),
            meta_path: base.join("meta"),
            temp_path: PathBuf::from(&config.temp_path),
        };
        for dir in [&store.objects_path, &store.meta_path, &store.temp_path] {
            std::fs::create_dir_all(dir)?;
        }
        info!(
            "Using local blob storage at {} (staging in {})",
            base.display(),
            store.temp_path.display()
        );
        Ok(store)
    }

    fn object_file(&self, path: &str) -> StorageResult<PathBuf> {
        validate_object_path(path)?;
        // A trailing separator names a directory on disk, not an object
        if path.ends_with('/') {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.objects_path.join(path))
    }

    fn sidecar_file(&self, path: &str) -> PathBuf {
        self.meta_path.join(format!("{}.json", path))
    }

    /// Write `contents` to a staging file and rename it over `target`
    async fn write_atomically(&self, target: &Path, contents: &[u8]) -> StorageResult<()> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let staging = self.temp_path.join(Uuid::new_v4().to_string());
        fs::write(&staging, contents).await?;
        if let Err(e) = fs::rename(&staging, target).await {
            let _ = fs::remove_file(&staging).await;
            return Err(e.into());
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put_object(&self, request: PutObject) -> StorageResult<()> {
        let target = self.object_file(&request.path)?;
        self.write_atomically(&target, &request.data).await?;

        let sidecar = ObjectSidecar {
            size: request.data.len() as u64,
            content_type: request.content_type,
            visibility: request.visibility,
            etag: hex::encode(md5::compute(&request.data).0),
            stored_at: Utc::now(),
        };
        let encoded = serde_json::to_vec(&sidecar)?;
        self.write_atomically(&self.sidecar_file(&request.path), &encoded)
            .await?;

        debug!("Stored object {} ({} bytes)", request.path, sidecar.size);
        Ok(())
    }

    async fn head_object(&self, path: &str) -> StorageResult<ObjectHead> {
        let target = self.object_file(path)?;
        let metadata = match fs::metadata(&target).await {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => return Err(StorageError::NotFound(path.to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let sidecar = match fs::read(self.sidecar_file(path)).await {
            Ok(raw) => Some(serde_json::from_slice::<ObjectSidecar>(&raw)?),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("Object {} has no metadata sidecar", path);
                None
            }
            Err(e) => return Err(e.into()),
        };

        Ok(ObjectHead {
            size: metadata.len(),
            content_type: sidecar
                .as_ref()
                .map(|s| s.content_type.clone())
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            etag: sidecar.map(|s| s.etag),
        })
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        let target = self.object_file(path)?;
        remove_if_present(&target).await?;
        remove_if_present(&self.sidecar_file(path)).await?;
        debug!("Deleted object {}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn store_in(dir: &TempDir) -> LocalBlobStore {
        let config = StorageConfig {
            backend: crate::config::StorageBackend::LocalFs,
            base_path: dir.path().join("storage").display().to_string(),
            temp_path: dir.path().join("temp").display().to_string(),
        };
        LocalBlobStore::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_local_blob_store_basic_operations() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);

        store
            .put_object(PutObject {
                path: "images/cat.png".to_string(),
                data: Bytes::from_static(b"Hello, Local Storage!"),
                content_type: "image/png".to_string(),
                visibility: Visibility::PublicRead,
            })
            .await
            .unwrap();

        let head = store.head_object("images/cat.png").await.unwrap();
        assert_eq!(head.size, 21);
        assert_eq!(head.content_type, "image/png");
        assert_eq!(
            head.etag.as_deref(),
            Some(hex::encode(md5::compute(b"Hello, Local Storage!").0).as_str())
        );

        // Staging directory is left empty after the rename
        assert_eq!(std::fs::read_dir(dir.path().join("temp")).unwrap().count(), 0);

        store.delete_object("images/cat.png").await.unwrap();
        assert!(matches!(
            store.head_object("images/cat.png").await,
            Err(StorageError::NotFound(_))
        ));

        // Deleting again is not an error
        store.delete_object("images/cat.png").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_blob_store_overwrite() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for body in [&b"first version"[..], &b"v2"[..]] {
            store
                .put_object(PutObject {
                    path: "avatar.png".to_string(),
                    data: Bytes::copy_from_slice(body),
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                    visibility: Visibility::PublicRead,
                })
                .await
                .unwrap();
        }
        assert_eq!(store.head_object("avatar.png").await.unwrap().size, 2);
    }

    #[tokio::test]
    async fn test_local_blob_store_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir);
        for path in ["../outside", "/abs", "dir/", ""] {
            let result = store
                .put_object(PutObject {
                    path: path.to_string(),
                    data: Bytes::from_static(b"x"),
                    content_type: DEFAULT_CONTENT_TYPE.to_string(),
                    visibility: Visibility::Private,
                })
                .await;
            assert!(matches!(result, Err(StorageError::InvalidPath(_))), "{}", path);
        }
    }
}
