//! Partition file sweep
//!
//! Drains recorded files of a partition from the blob store. File rows carry
//! no foreign key to their partition, so after a partition is deleted its rows
//! stay behind until a sweep removes them. A row is only forgotten once its
//! blob delete succeeded, which makes re-running a sweep retry exactly the
//! failures of the previous run. Concurrent sweeps of the same partition are
//! harmless since both blob and row deletes are idempotent.

use crate::error::GatewayError;
use crate::metadata::MetadataStorage;
use crate::service::storage_service::StorageService;
use futures::future::join_all;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Deletes dispatched, one per recorded file
    pub dispatched: usize,
    /// Blobs deleted and their rows forgotten
    pub removed: usize,
    /// Files left recorded for a later sweep
    pub failed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.dispatched += other.dispatched;
        self.removed += other.removed;
        self.failed += other.failed;
    }
}

#[derive(Clone)]
pub struct SweepService {
    store: Arc<dyn MetadataStorage>,
    storage: StorageService,
}

impl SweepService {
    pub fn new(store: Arc<dyn MetadataStorage>, storage: StorageService) -> Self {
        Self { store, storage }
    }

    /// Delete every recorded file of `partition` in a single pass.
    ///
    /// One task is spawned per file and all of them are awaited before the
    /// report is returned. Individual failures are logged, never retried.
    pub async fn sweep_partition(&self, partition: &str) -> Result<SweepReport, GatewayError> {
        let files = self
            .store
            .list_files(partition)
            .map_err(|e| GatewayError::internal("Error listing partition files", e))?;
        if files.is_empty() {
            debug!("No recorded files to sweep for partition {}", partition);
            return Ok(SweepReport::default());
        }

        info!("Sweeping {} files of partition {}", files.len(), partition);
        let handles: Vec<_> = files
            .into_iter()
            .map(|path| {
                let store = self.store.clone();
                let storage = self.storage.clone();
                let partition = partition.to_string();
                tokio::spawn(async move {
                    if storage.delete(&path).await.is_err() {
                        warn!("Sweep could not delete {} of partition {}", path, partition);
                        return false;
                    }
                    if let Err(e) = store.delete_file(&partition, &path) {
                        warn!("Sweep deleted {} but kept its record: {}", path, e);
                        return false;
                    }
                    true
                })
            })
            .collect();

        let dispatched = handles.len();
        let removed = join_all(handles)
            .await
            .into_iter()
            .filter(|outcome| matches!(outcome, Ok(true)))
            .count();

        let report = SweepReport {
            dispatched,
            removed,
            failed: dispatched - removed,
        };
        if report.failed > 0 {
            warn!(
                "Sweep of partition {} left {} of {} files behind",
                partition, report.failed, report.dispatched
            );
        } else {
            info!("Sweep of partition {} removed {} files", partition, report.removed);
        }
        Ok(report)
    }

    /// Sweep every partition name that still has recorded files but no
    /// partition definition
    pub async fn sweep_orphans(&self) -> Result<SweepReport, GatewayError> {
        let orphans = self
            .store
            .orphaned_partitions()
            .map_err(|e| GatewayError::internal("Error listing orphaned partitions", e))?;

        let mut total = SweepReport::default();
        for partition in orphans {
            total.merge(self.sweep_partition(&partition).await?);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::metadata::{Partition, PathRule};
    use crate::storage::mock_store::MockBlobStore;

    fn setup() -> (Arc<MockMetadataStore>, Arc<MockBlobStore>, SweepService) {
        let store = Arc::new(MockMetadataStore::new());
        let blobs = Arc::new(MockBlobStore::new());
        let sweeper = SweepService::new(store.clone(), StorageService::new(blobs.clone()));
        (store, blobs, sweeper)
    }

    fn record(store: &MockMetadataStore, blobs: &MockBlobStore, partition: &str, path: &str) {
        blobs.insert(path, b"data", "text/plain");
        store.insert_file(partition, path).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_removes_files_and_rows() {
        let (store, blobs, sweeper) = setup();
        for i in 0..5 {
            record(&store, &blobs, "docs", &format!("docs/{}.txt", i));
        }
        record(&store, &blobs, "other", "other/keep.txt");

        let report = sweeper.sweep_partition("docs").await.unwrap();
        assert_eq!(report, SweepReport { dispatched: 5, removed: 5, failed: 0 });
        assert_eq!(blobs.object_count(), 1);
        assert!(store.list_files("docs").unwrap().is_empty());
        assert_eq!(store.list_files("other").unwrap(), vec!["other/keep.txt".to_string()]);

        // Nothing left, so a second sweep is a no-op
        assert_eq!(sweeper.sweep_partition("docs").await.unwrap(), SweepReport::default());
    }

    #[tokio::test]
    async fn test_sweep_completes_despite_failures_and_retries_later() {
        let (store, blobs, sweeper) = setup();
        record(&store, &blobs, "docs", "docs/a");
        record(&store, &blobs, "docs", "docs/b");

        blobs.set_fail_deletes(true);
        let report = sweeper.sweep_partition("docs").await.unwrap();
        assert_eq!(report, SweepReport { dispatched: 2, removed: 0, failed: 2 });
        assert_eq!(store.list_files("docs").unwrap().len(), 2);

        blobs.set_fail_deletes(false);
        let report = sweeper.sweep_partition("docs").await.unwrap();
        assert_eq!(report.removed, 2);
        assert_eq!(blobs.object_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_orphans_skips_live_partitions() {
        let (store, blobs, sweeper) = setup();
        store
            .insert_partition(&Partition {
                name: "live".to_string(),
                max_size: 100,
                path_rule: PathRule::Prefix("live".to_string()),
                validates: String::new(),
            })
            .unwrap();
        record(&store, &blobs, "live", "live/a");
        record(&store, &blobs, "gone", "gone/a");
        record(&store, &blobs, "gone", "gone/b");
        record(&store, &blobs, "also-gone", "also-gone/a");

        let report = sweeper.sweep_orphans().await.unwrap();
        assert_eq!(report, SweepReport { dispatched: 3, removed: 3, failed: 0 });
        assert_eq!(store.file_count(), 1);
        assert!(blobs.object("live/a").is_some());
    }
}
