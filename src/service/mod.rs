//! Service layer
//!
//! Services wrap the metadata and blob store traits, classify their failures
//! into `GatewayError` and compose them into the gateway's operations.

pub mod partition_service;
pub mod quota_service;
pub mod storage_service;
pub mod sweep_service;
pub mod sweep_worker;
pub mod upload_service;

pub use partition_service::PartitionService;
pub use quota_service::{QuotaLedger, Reservation};
pub use storage_service::StorageService;
pub use sweep_service::{SweepReport, SweepService};
pub use sweep_worker::SweepWorker;
pub use upload_service::{DeleteRequest, UploadRequest, UploadService};
