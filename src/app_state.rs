//! Application State Management
//!
//! This module provides the application state that contains all services
//! and their dependencies, following the dependency injection pattern.
//! Everything is built once at startup from `AppConfig`; nothing is
//! registered globally.

use std::sync::Arc;
use log::info;
use thiserror::Error;

use crate::auth::SudoKey;
use crate::config::{AppConfig, MetadataBackend, StorageBackend};
use crate::metadata::{mock_store::MockMetadataStore, sqlite_store::SQLiteMetadataStore, MetadataError, MetadataStorage};
use crate::service::{PartitionService, QuotaLedger, StorageService, SweepService, UploadService};
use crate::storage::{local_store::LocalBlobStore, mock_store::MockBlobStore, BlobStore, StorageError};
use crate::validation::ValidationPipeline;

/// Backend initialisation failures
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("metadata backend: {0}")]
    Metadata(#[from] MetadataError),

    #[error("blob backend: {0}")]
    Storage(#[from] StorageError),
}

/// Application state containing all services and their dependencies
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub sudo_key: SudoKey,
    pub partitions: PartitionService,
    pub uploads: UploadService,
    pub sweeper: SweepService,
    pub ledger: QuotaLedger,
}

impl AppState {
    /// Create application state from configuration
    pub fn from_config(config: AppConfig) -> Result<Self, StartupError> {
        info!("Initializing application state with configuration");

        let blobs: Arc<dyn BlobStore> = match config.storage.backend {
            StorageBackend::LocalFs => Arc::new(LocalBlobStore::new(&config.storage)?),
            StorageBackend::Mock => {
                info!("Using mock blob storage backend");
                Arc::new(MockBlobStore::new())
            }
        };

        let metadata: Arc<dyn MetadataStorage> = match config.metadata.backend {
            MetadataBackend::SQLite => {
                info!(
                    "Using SQLite metadata backend with db_path: {}, wal_mode: {}",
                    config.metadata.db_path, config.metadata.wal_mode
                );
                Arc::new(SQLiteMetadataStore::open(&config.metadata)?)
            }
            MetadataBackend::Mock => {
                info!("Using mock metadata backend");
                Arc::new(MockMetadataStore::new())
            }
        };

        let state = Self::with_backends(config, metadata, blobs);
        info!("Application state initialized successfully");
        Ok(state)
    }

    /// Wire the services around already constructed backends
    pub fn with_backends(
        config: AppConfig,
        metadata: Arc<dyn MetadataStorage>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        let validators = Arc::new(ValidationPipeline::with_builtin());
        let storage = StorageService::new(blobs);
        let ledger = QuotaLedger::new(metadata.clone());
        let sweeper = SweepService::new(metadata.clone(), storage.clone());
        let partitions = PartitionService::new(metadata.clone(), validators.clone(), sweeper.clone());
        let uploads = UploadService::new(
            partitions.clone(),
            ledger.clone(),
            validators,
            storage,
            metadata,
            config.server.max_upload_size,
        );

        Self {
            sudo_key: SudoKey::new(&config.auth.sudo_key),
            config,
            partitions,
            uploads,
            sweeper,
            ledger,
        }
    }

    /// Create application state for testing with mock backends
    pub fn new_for_testing(sudo_key: &str) -> Self {
        let mut config = AppConfig::default();
        config.auth.sudo_key = sudo_key.to_string();
        Self::with_backends(
            config,
            Arc::new(MockMetadataStore::new()),
            Arc::new(MockBlobStore::new()),
        )
    }
}
