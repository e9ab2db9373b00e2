//! Quota ledger
//!
//! Admission control for partition usage. A successful `reserve` hands back a
//! [`Reservation`] guard that releases its bytes again unless it is committed,
//! so every exit path of an upload after admission is compensated, including
//! the request future being dropped on client disconnect.

use crate::error::GatewayError;
use crate::metadata::{MetadataError, MetadataStorage};
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Per-partition usage accounting backed by the metadata store's
/// conditional write
#[derive(Clone)]
pub struct QuotaLedger {
    store: Arc<dyn MetadataStorage>,
}

impl QuotaLedger {
    pub fn new(store: Arc<dyn MetadataStorage>) -> Self {
        Self { store }
    }

    /// Admit `size` bytes into a partition or fail with `QuotaExceeded`.
    ///
    /// Usage is unchanged on failure. The first-write-too-large and
    /// increment-too-large cases are not distinguished.
    pub fn reserve(&self, partition: &str, size: u64) -> Result<Reservation, GatewayError> {
        match self.store.reserve_usage(partition, size) {
            Ok(()) => {
                debug!("Reserved {} bytes in partition {}", size, partition);
                Ok(Reservation {
                    ledger: self.clone(),
                    partition: partition.to_string(),
                    size,
                    armed: true,
                })
            }
            Err(MetadataError::QuotaExceeded { .. }) => {
                info!("Rejected {} bytes for partition {}: quota exceeded", size, partition);
                Err(GatewayError::QuotaExceeded)
            }
            Err(e) => Err(GatewayError::internal("Error reserving partition usage", e)),
        }
    }

    /// Best-effort decrement. Failures are logged for the operator and
    /// reported as `false`; they never fail the caller's operation.
    pub fn release(&self, partition: &str, size: u64) -> bool {
        match self.store.release_usage(partition, size) {
            Ok(()) => {
                debug!("Released {} bytes from partition {}", size, partition);
                true
            }
            Err(e) => {
                error!(
                    "Failed to release {} bytes from partition {}, usage is over-counted: {}",
                    size, partition, e
                );
                false
            }
        }
    }

    /// Currently recorded usage of a partition
    pub fn usage(&self, partition: &str) -> Result<u64, GatewayError> {
        self.store
            .usage(partition)
            .map_err(|e| GatewayError::internal("Error reading partition usage", e))
    }
}

/// Bytes admitted by [`QuotaLedger::reserve`] and not yet settled.
///
/// Dropping an armed reservation releases it. The release is a synchronous
/// metadata call, so it completes even when the owning future is cancelled.
#[must_use = "an unsettled reservation is released when dropped"]
pub struct Reservation {
    ledger: QuotaLedger,
    partition: String,
    size: u64,
    armed: bool,
}

impl Reservation {
    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Keep the reserved bytes counted against the partition
    pub fn commit(mut self) {
        self.armed = false;
    }

    /// Undo the reservation now
    pub fn compensate(mut self) {
        self.armed = false;
        info!(
            "Compensating reservation of {} bytes in partition {}",
            self.size, self.partition
        );
        self.ledger.release(&self.partition, self.size);
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            warn!(
                "Reservation of {} bytes in partition {} abandoned, releasing",
                self.size, self.partition
            );
            self.ledger.release(&self.partition, self.size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::mock_store::MockMetadataStore;
    use crate::metadata::{Partition, PathRule};

    fn ledger_with_partition(max_size: u64) -> (Arc<MockMetadataStore>, QuotaLedger) {
        let store = Arc::new(MockMetadataStore::new());
        store
            .insert_partition(&Partition {
                name: "images".to_string(),
                max_size,
                path_rule: PathRule::Prefix("images/".to_string()),
                validates: String::new(),
            })
            .unwrap();
        let ledger = QuotaLedger::new(store.clone());
        (store, ledger)
    }

    #[test]
    fn test_commit_keeps_usage() {
        let (_, ledger) = ledger_with_partition(100);
        let reservation = ledger.reserve("images", 60).unwrap();
        assert_eq!(reservation.size(), 60);
        assert_eq!(reservation.partition(), "images");
        reservation.commit();
        assert_eq!(ledger.usage("images").unwrap(), 60);
    }

    #[test]
    fn test_compensate_and_drop_release_usage() {
        let (_, ledger) = ledger_with_partition(100);
        ledger.reserve("images", 40).unwrap().commit();

        ledger.reserve("images", 30).unwrap().compensate();
        assert_eq!(ledger.usage("images").unwrap(), 40);

        {
            let _abandoned = ledger.reserve("images", 50).unwrap();
            assert_eq!(ledger.usage("images").unwrap(), 90);
        }
        assert_eq!(ledger.usage("images").unwrap(), 40);
    }

    #[test]
    fn test_quota_exceeded_leaves_usage_unchanged() {
        let (_, ledger) = ledger_with_partition(100);
        assert!(matches!(ledger.reserve("images", 101), Err(GatewayError::QuotaExceeded)));
        assert_eq!(ledger.usage("images").unwrap(), 0);

        ledger.reserve("images", 100).unwrap().commit();
        assert!(matches!(ledger.reserve("images", 1), Err(GatewayError::QuotaExceeded)));
        assert_eq!(ledger.usage("images").unwrap(), 100);
    }

    #[test]
    fn test_release_failure_is_not_fatal() {
        let (store, ledger) = ledger_with_partition(100);
        ledger.reserve("images", 10).unwrap().commit();
        store.set_fail_releases(true);
        assert!(!ledger.release("images", 10));
        ledger.reserve("images", 5).unwrap().compensate();
        assert_eq!(ledger.usage("images").unwrap(), 15);
    }
}
