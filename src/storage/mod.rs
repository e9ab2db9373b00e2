//! Blob Storage Layer Abstraction
//!
//! This module provides an abstraction over the backing object store,
//! allowing the gateway to write to different implementations (local files,
//! remote object services) without affecting the orchestration layer.
//! Blob stores are not transactional: callers order their calls so that the
//! metadata store never under-counts what physically exists here.

pub mod local_store;
pub mod mock_store;


use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Content type recorded when the client does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Who may read a stored object
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    PublicRead,
    Private,
}

/// A put-object request
#[derive(Debug, Clone)]
pub struct PutObject {
    /// Full object path inside the store
    pub path: String,
    pub data: Bytes,
    pub content_type: String,
    pub visibility: Visibility,
}

/// Result of a head-object request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    /// Stored size in bytes
    pub size: u64,
    pub content_type: String,
    /// Hex md5 of the stored bytes, when the backend records one
    pub etag: Option<String>,
}

/// Blob storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata sidecar error: {0}")]
    Sidecar(#[from] serde_json::Error),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type for blob storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Trait defining the blob storage interface
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store (or overwrite) an object
    async fn put_object(&self, request: PutObject) -> StorageResult<()>;

    /// Size and content type of an object; `NotFound` if it does not exist
    async fn head_object(&self, path: &str) -> StorageResult<ObjectHead>;

    /// Delete an object. Deleting a missing object succeeds.
    async fn delete_object(&self, path: &str) -> StorageResult<()>;
}

/// Check that an object path is a clean relative key: non-empty, not
/// absolute, and free of `.`/`..`/empty segments.
pub fn validate_object_path(path: &str) -> StorageResult<()> {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    let trimmed = path.strip_suffix('/').unwrap_or(path);
    if trimmed
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(())
}
