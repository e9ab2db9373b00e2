//! Mock implementation of BlobStore trait for testing

use crate::storage::{BlobStore, ObjectHead, PutObject, StorageError, StorageResult, Visibility};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    visibility: Visibility,
}

/// Mock implementation of BlobStore for testing.
///
/// Failure switches let tests break individual saga steps, and the call
/// counters let them assert that a step was never reached.
pub struct MockBlobStore {
    objects: Mutex<HashMap<String, StoredObject>>,
    fail_puts: AtomicBool,
    fail_heads: AtomicBool,
    fail_deletes: AtomicBool,
    put_calls: AtomicUsize,
    delete_calls: AtomicUsize,
}

impl MockBlobStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            fail_puts: AtomicBool::new(false),
            fail_heads: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            put_calls: AtomicUsize::new(0),
            delete_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_heads(&self, fail: bool) {
        self.fail_heads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Number of put attempts, failed ones included
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of delete attempts, failed ones included
    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    /// Number of objects currently stored
    pub fn object_count(&self) -> usize {
        self.objects.lock().map(|o| o.len()).unwrap_or(0)
    }

    /// Stored bytes for a path, if present
    pub fn object(&self, path: &str) -> Option<Bytes> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(path).map(|obj| obj.data.clone()))
    }

    /// Visibility recorded for a path, if present
    pub fn visibility(&self, path: &str) -> Option<Visibility> {
        self.objects
            .lock()
            .ok()
            .and_then(|o| o.get(path).map(|obj| obj.visibility))
    }

    /// Place an object directly, bypassing the failure switches
    pub fn insert(&self, path: &str, data: &[u8], content_type: &str) {
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(
                path.to_string(),
                StoredObject {
                    data: Bytes::copy_from_slice(data),
                    content_type: content_type.to_string(),
                    visibility: Visibility::PublicRead,
                },
            );
        }
    }

    fn objects(&self) -> StorageResult<MutexGuard<'_, HashMap<String, StoredObject>>> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Backend("mock blob lock poisoned".to_string()))
    }
}

impl Default for MockBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BlobStore for MockBlobStore {
    async fn put_object(&self, request: PutObject) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected put failure".to_string()));
        }
        self.objects()?.insert(
            request.path,
            StoredObject {
                data: request.data,
                content_type: request.content_type,
                visibility: request.visibility,
            },
        );
        Ok(())
    }

    async fn head_object(&self, path: &str) -> StorageResult<ObjectHead> {
        if self.fail_heads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected head failure".to_string()));
        }
        let objects = self.objects()?;
        let object = objects
            .get(path)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))?;
        Ok(ObjectHead {
            size: object.data.len() as u64,
            content_type: object.content_type.clone(),
            etag: None,
        })
    }

    async fn delete_object(&self, path: &str) -> StorageResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected delete failure".to_string()));
        }
        self.objects()?.remove(path);
        Ok(())
    }
}
