//! Upload and delete orchestration
//!
//! The metadata store and the blob store cannot commit together, so uploads
//! run as a saga ordered to keep recorded usage conservative:
//!
//! 1. authorise the key for the partition and resolve the object path
//! 2. require a declared length within the server upload ceiling
//! 3. reserve that many bytes (nothing else runs if this is refused)
//! 4. buffer the body, capped at the reserved size
//! 5. run the partition's validation policy
//! 6. write the blob
//! 7. record the file
//!
//! Any failure in steps 4-6 releases the reservation. Once the blob is
//! written the reservation is kept even if recording the file fails, since
//! the bytes now exist in the blob store. Steps 5-7 run on their own task so
//! a client disconnect cannot interrupt a blob write halfway.

use crate::error::GatewayError;
use crate::metadata::{MetadataStorage, Partition};
use crate::service::partition_service::PartitionService;
use crate::service::quota_service::{QuotaLedger, Reservation};
use crate::service::storage_service::StorageService;
use crate::storage::validate_object_path;
use crate::validation::ValidationPipeline;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use log::{debug, error, info, warn};
use std::fmt::Display;
use std::sync::Arc;

/// Parameters of an upload
#[derive(Debug, Clone, Default)]
pub struct UploadRequest {
    pub key: String,
    pub partition: String,
    pub relative_path: String,
    /// Declared body length; required
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
}

/// Parameters of a delete
#[derive(Debug, Clone, Default)]
pub struct DeleteRequest {
    pub key: String,
    pub partition: String,
    pub relative_path: String,
}

/// Reject relative paths that would step outside the partition
fn check_relative_path(relative_path: &str) -> Result<(), GatewayError> {
    if relative_path
        .split('/')
        .any(|segment| segment == "." || segment == "..")
    {
        return Err(GatewayError::InvalidPath("Invalid path".to_string()));
    }
    Ok(())
}

fn object_path(partition: &Partition, relative_path: &str) -> Result<String, GatewayError> {
    check_relative_path(relative_path)?;
    let path = partition.resolve_path(relative_path);
    // A trailing separator names a directory, never an object
    if path.ends_with('/') {
        return Err(GatewayError::InvalidPath("Invalid path".to_string()));
    }
    validate_object_path(&path).map_err(|_| GatewayError::InvalidPath("Invalid path".to_string()))?;
    Ok(path)
}

/// Buffer exactly `size` bytes of the body. Anything past `size` is ignored.
async fn read_body<S, E>(mut body: S, size: u64) -> Result<Bytes, GatewayError>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Display,
{
    let expected = usize::try_from(size)
        .map_err(|_| GatewayError::InvalidHeaders("Content-Length is out of range".to_string()))?;
    let mut buffer = BytesMut::with_capacity(expected);
    while buffer.len() < expected {
        match body.next().await {
            Some(Ok(chunk)) => {
                let take = chunk.len().min(expected - buffer.len());
                buffer.extend_from_slice(&chunk[..take]);
            }
            Some(Err(e)) => {
                warn!("Error reading upload body: {}", e);
                return Err(GatewayError::InvalidHeaders(
                    "Request body could not be read".to_string(),
                ));
            }
            None => {
                return Err(GatewayError::InvalidHeaders(format!(
                    "Request body is {} bytes, Content-Length declared {}",
                    buffer.len(),
                    expected
                )));
            }
        }
    }
    Ok(buffer.freeze())
}

/// The upload/delete saga coordinator
#[derive(Clone)]
pub struct UploadService {
    partitions: PartitionService,
    ledger: QuotaLedger,
    validators: Arc<ValidationPipeline>,
    storage: StorageService,
    store: Arc<dyn MetadataStorage>,
    max_upload_size: u64,
}

impl UploadService {
    pub fn new(
        partitions: PartitionService,
        ledger: QuotaLedger,
        validators: Arc<ValidationPipeline>,
        storage: StorageService,
        store: Arc<dyn MetadataStorage>,
        max_upload_size: u64,
    ) -> Self {
        Self {
            partitions,
            ledger,
            validators,
            storage,
            store,
            max_upload_size,
        }
    }

    /// Store an object and return its size in bytes
    pub async fn upload<S, E>(&self, request: UploadRequest, body: S) -> Result<u64, GatewayError>
    where
        S: Stream<Item = Result<Bytes, E>> + Unpin,
        E: Display,
    {
        let partition = self.partitions.authorize(&request.key, &request.partition)?;
        let path = object_path(&partition, &request.relative_path)?;

        let size = request.content_length.ok_or_else(|| {
            GatewayError::InvalidHeaders("Content-Length header is required".to_string())
        })?;
        if size > self.max_upload_size {
            return Err(GatewayError::UploadTooLarge {
                limit: self.max_upload_size,
            });
        }

        let reservation = self.ledger.reserve(&partition.name, size)?;

        let data = match read_body(body, size).await {
            Ok(data) => data,
            Err(e) => {
                reservation.compensate();
                return Err(e);
            }
        };

        let service = self.clone();
        let content_type = request.content_type;
        tokio::spawn(async move {
            service
                .store_object(reservation, partition, path, data, content_type)
                .await
        })
        .await
        .map_err(|e| GatewayError::internal("Upload task failed", e))?
    }

    async fn store_object(
        &self,
        reservation: Reservation,
        partition: Partition,
        path: String,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<u64, GatewayError> {
        let data = if partition.validates.is_empty() {
            data
        } else {
            match self.validators.execute(data, &partition.validates) {
                Ok(data) => data,
                Err(e) => {
                    info!("Upload to {} failed validation: {}", path, e);
                    reservation.compensate();
                    return Err(GatewayError::ValidationFailed(e.0));
                }
            }
        };

        if let Err(e) = self.storage.put(&path, data, content_type.as_deref()).await {
            reservation.compensate();
            return Err(e);
        }

        // The blob exists from here on; its bytes stay counted
        let size = reservation.size();
        reservation.commit();

        self.store.insert_file(&partition.name, &path).map_err(|e| {
            GatewayError::internal(&format!("Blob {} stored but not recorded", path), e)
        })?;

        info!("Uploaded {} ({} bytes) to partition {}", path, size, partition.name);
        Ok(size)
    }

    /// Delete an object and return the size released from the partition
    pub async fn delete(&self, request: DeleteRequest) -> Result<u64, GatewayError> {
        let partition = self.partitions.authorize(&request.key, &request.partition)?;
        let path = object_path(&partition, &request.relative_path)?;

        let head = self.storage.head(&path).await?;
        self.storage.delete(&path).await?;

        self.store.delete_file(&partition.name, &path).map_err(|e| {
            GatewayError::internal(&format!("Blob {} deleted but still recorded", path), e)
        })?;

        if !self.ledger.release(&partition.name, head.size) {
            error!("Usage of partition {} left {} bytes high after deleting {}", partition.name, head.size, path);
        }
        debug!("Deleted {} ({} bytes) from partition {}", path, head.size, partition.name);
        Ok(head.size)
    }
}
