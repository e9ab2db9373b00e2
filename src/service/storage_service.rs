//! Storage service layer that classifies blob store failures at the boundary

use crate::error::GatewayError;
use crate::storage::{BlobStore, ObjectHead, PutObject, StorageError, Visibility, DEFAULT_CONTENT_TYPE};
use bytes::Bytes;
use log::debug;
use std::sync::Arc;

/// Storage service that provides a clean interface to the blob store abstraction
#[derive(Clone)]
pub struct StorageService {
    store: Arc<dyn BlobStore>,
}

impl StorageService {
    /// Create a new storage service with injected blob backend
    pub fn new(store: Arc<dyn BlobStore>) -> Self {
        Self { store }
    }

    /// Write a public-read object, defaulting the content type when the
    /// client declared none
    pub async fn put(
        &self,
        path: &str,
        data: Bytes,
        content_type: Option<&str>,
    ) -> Result<(), GatewayError> {
        let content_type = content_type
            .filter(|ct| !ct.is_empty())
            .unwrap_or(DEFAULT_CONTENT_TYPE);
        debug!("Writing {} bytes to {} as {}", data.len(), path, content_type);
        self.store
            .put_object(PutObject {
                path: path.to_string(),
                data,
                content_type: content_type.to_string(),
                visibility: Visibility::PublicRead,
            })
            .await
            .map_err(|e| match e {
                StorageError::InvalidPath(p) => GatewayError::InvalidPath(format!("Invalid path: {}", p)),
                other => GatewayError::internal("Error uploading blob", other),
            })
    }

    /// Size and content type of an existing object; `InvalidPath` when absent
    pub async fn head(&self, path: &str) -> Result<ObjectHead, GatewayError> {
        self.store.head_object(path).await.map_err(|e| match e {
            StorageError::NotFound(_) => GatewayError::InvalidPath("File not found".to_string()),
            StorageError::InvalidPath(p) => GatewayError::InvalidPath(format!("Invalid path: {}", p)),
            other => GatewayError::internal("Error reading blob head", other),
        })
    }

    /// Delete an object; a missing object is not an error
    pub async fn delete(&self, path: &str) -> Result<(), GatewayError> {
        self.store
            .delete_object(path)
            .await
            .map_err(|e| GatewayError::internal("Error deleting blob", e))
    }
}
